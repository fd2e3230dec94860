//! HTML chat page.
//!
//! The template is compiled into the binary; `.html` templates get minijinja's HTML
//! auto-escaping. User text goes through that escaping; assistant text is markdown
//! and is converted here, with raw HTML neutralized, before being marked safe.

use minijinja::{Environment, Value, context};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

use pdf_chat::Transcript;

const CHAT_TEMPLATE_NAME: &str = "chat.html";
const CHAT_TEMPLATE: &str = include_str!("../templates/chat.html");

pub const PAGE_TITLE: &str = "AiCouncil PDF Chatbot";
pub const PROMPT_LABEL: &str = "Ask a question about AiCouncil courses or training:";

pub struct ChatPage {
    env: Environment<'static>,
}

impl ChatPage {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(CHAT_TEMPLATE_NAME, CHAT_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(
        &self,
        session_id: &str,
        transcript: &Transcript,
        error: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let turns: Vec<Value> = transcript
            .iter()
            .map(|turn| {
                context! {
                    user => turn.user.as_str(),
                    assistant_html => Value::from_safe_string(render_markdown(&turn.assistant)),
                }
            })
            .collect();

        let template = self.env.get_template(CHAT_TEMPLATE_NAME)?;
        template.render(context! {
            title => PAGE_TITLE,
            prompt_label => PROMPT_LABEL,
            session_id => session_id,
            turns => turns,
            error => error,
        })
    }
}

/// Render model output as HTML. Embedded HTML is emitted as escaped text and
/// script-capable link targets are dropped.
pub fn render_markdown(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(content, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    // Browsers ignore whitespace and control characters inside a scheme.
    let scheme: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    if ["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|blocked| scheme.starts_with(blocked))
    {
        CowStr::Borrowed("#")
    } else {
        url
    }
}
