use crate::context::IdentityContext;
use crate::llm::provider::ChatMessage;

/// Which of the three system prompts to build. All of them embed the same
/// identity context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMode {
    Chat,
    Evaluate,
    Revise {
        rejected_reply: String,
        feedback: String,
    },
}

pub fn build_system_prompt(identity: &IdentityContext, mode: &PromptMode) -> String {
    match mode {
        PromptMode::Chat => chat_prompt(identity),
        PromptMode::Evaluate => {
            let name = identity.name();
            let mut prompt = format!(
                "You are an evaluator that decides whether a response to a question is acceptable. \
You are provided with a conversation between a User and an Agent. Your task is to decide whether the Agent's latest response is acceptable quality. \
The Agent is playing the role of {name} and is representing {name} on their website. \
The Agent has been instructed to be professional and engaging, as if talking to a potential client or future employer who came across the website. \
The Agent may ask for the user's email address to get in touch and is allowed to do so. \
The Agent has been provided with context on {name} in the form of their summary and resume. Here's the information:"
            );
            prompt.push_str(&context_section(identity));
            prompt.push_str(
                "With this context, please evaluate the latest response, replying with whether the response is acceptable and your feedback.",
            );
            prompt
        }
        PromptMode::Revise {
            rejected_reply,
            feedback,
        } => {
            let mut prompt = chat_prompt(identity);
            prompt.push_str(
                "\n\n## Previous answer rejected\nYou just tried to reply, but the quality control rejected your reply\n",
            );
            prompt.push_str(&format!("## Your attempted answer:\n{rejected_reply}\n\n"));
            prompt.push_str(&format!("## Reason for rejection:\n{feedback}\n\n"));
            prompt
        }
    }
}

fn chat_prompt(identity: &IdentityContext) -> String {
    let name = identity.name();
    let mut prompt = format!(
        "You are acting as {name}. You are answering questions on {name}'s website, \
particularly questions related to {name}'s career, background, skills and experience. \
Your responsibility is to represent {name} for interactions on the website as faithfully as possible. \
You are given a summary of {name}'s background and resume which you can use to answer questions. \
Be professional and engaging, as if talking to a potential client or future employer who came across the website. \
If you don't know the answer to any question, use your record_unknown_question tool to record the question that you couldn't answer, even if it's about something trivial or unrelated to career. \
If the user is engaging in discussion, try to steer them towards getting in touch via email; ask for their email and record it using your record_user_details tool. "
    );
    prompt.push_str(&context_section(identity));
    prompt.push_str(&format!(
        "With this context, please chat with the user, always staying in character as {name}."
    ));
    prompt
}

fn context_section(identity: &IdentityContext) -> String {
    format!(
        "\n\n## Summary:\n{}\n\n## Resume:\n{}\n\n",
        identity.biography(),
        identity.resume_text()
    )
}

/// The evaluator's user message: prior transcript, latest visitor message and
/// the candidate reply.
pub fn evaluator_user_prompt(reply: &str, message: &str, history: &[ChatMessage]) -> String {
    let mut prompt = format!(
        "Here's the conversation between the User and the Agent: \n\n{}\n\n",
        render_transcript(history)
    );
    prompt.push_str(&format!(
        "Here's the latest message from the User: \n\n{message}\n\n"
    ));
    prompt.push_str(&format!(
        "Here's the latest response from the Agent: \n\n{reply}\n\n"
    ));
    prompt.push_str(
        "Please evaluate the response, replying with whether it is acceptable and your feedback.",
    );
    prompt
}

pub fn render_transcript(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "(no earlier messages)".to_string();
    }

    history
        .iter()
        .filter_map(|message| match message {
            ChatMessage::System { .. } => None,
            ChatMessage::User { content } => Some(format!("User: {content}")),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut line = format!("Agent: {}", content.as_deref().unwrap_or(""));
                for call in tool_calls {
                    line.push_str(&format!(" [called {}({})]", call.name, call.arguments));
                }
                Some(line)
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => Some(format!("Tool result {tool_call_id}: {content}")),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
