//! The render bridge: one self-contained templated page embedding the
//! resolved dependencies and the note content, plus the typed message
//! protocol the host exchanges with the embedded renderer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Host -> renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    UpdateMarkdown { markdown: String },
}

/// Renderer -> host. A closed set of typed events; the host never pattern-
/// matches human-readable log text to detect a state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RendererMessage {
    Ready,
    RenderOk,
    RenderError { detail: String },
}

impl HostMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

impl RendererMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    AwaitingReady,
    AwaitingRenderAck,
    Rendered,
    Failed { detail: String },
}

/// Drives one embedded renderer:
/// `Idle -> AwaitingReady -> AwaitingRenderAck -> Rendered`, re-entering
/// `AwaitingRenderAck` whenever new content is pushed (after a save).
#[derive(Debug)]
pub struct RenderSession {
    state: RenderState,
    /// Content waiting for the renderer to come up.
    pending: Option<String>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self {
            state: RenderState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Call when the built page is handed to the renderer surface; the
    /// content waits for the renderer's `ready`.
    pub fn present(&mut self, markdown: String) {
        self.pending = Some(markdown);
        self.state = RenderState::AwaitingReady;
    }

    /// Feeds a renderer event through the state machine, returning the reply
    /// the host should post back, if any. Out-of-order messages are logged
    /// and dropped, never acted on.
    pub fn on_message(&mut self, message: RendererMessage) -> Option<HostMessage> {
        match message {
            RendererMessage::Ready if self.state == RenderState::AwaitingReady => {
                match self.pending.take() {
                    Some(markdown) => {
                        self.state = RenderState::AwaitingRenderAck;
                        Some(HostMessage::UpdateMarkdown { markdown })
                    }
                    None => {
                        self.state = RenderState::Idle;
                        None
                    }
                }
            }
            RendererMessage::RenderOk if self.state == RenderState::AwaitingRenderAck => {
                self.state = RenderState::Rendered;
                None
            }
            RendererMessage::RenderError { detail }
                if self.state == RenderState::AwaitingRenderAck =>
            {
                log::error!("renderer failed: {detail}");
                self.state = RenderState::Failed { detail };
                None
            }
            other => {
                log::warn!("ignoring {other:?} in state {:?}", self.state);
                None
            }
        }
    }

    /// Pushes new content (after a save). If the renderer is already up, the
    /// update goes out immediately; otherwise it waits for `ready`.
    pub fn push(&mut self, markdown: String) -> Option<HostMessage> {
        match self.state {
            RenderState::Idle | RenderState::AwaitingReady => {
                self.pending = Some(markdown);
                None
            }
            _ => {
                self.state = RenderState::AwaitingRenderAck;
                Some(HostMessage::UpdateMarkdown { markdown })
            }
        }
    }
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RenderPage;

impl RenderPage {
    /// Builds one self-contained page: a stylesheet link or script tag for
    /// every resolved dependency, and the note content embedded as a JSON
    /// string literal so quotes, backslashes and newlines cannot break out
    /// of the script context.
    pub fn build(markdown: &str, dependencies: &[(String, PathBuf)]) -> String {
        let mut links = String::new();
        let mut scripts = String::new();
        for (name, path) in dependencies {
            let path = path.display();
            if name.ends_with(".css") {
                links.push_str(&format!("  <link rel=\"stylesheet\" href=\"{path}\">\n"));
            } else if name.ends_with(".js") {
                scripts.push_str(&format!("  <script src=\"{path}\"></script>\n"));
            }
        }

        let initial = serde_json::to_string(markdown).unwrap();
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
{links}</head>
<body>
  <div id="content"></div>
{scripts}  <script>
    const initialMarkdown = {initial};

    function post(message) {{
      window.satchelHost.postMessage(JSON.stringify(message));
    }}

    function render(markdown) {{
      try {{
        document.getElementById("content").innerHTML = marked.parse(markdown);
        renderMathInElement(document.getElementById("content"));
        hljs.highlightAll();
        post({{ type: "renderOk" }});
      }} catch (error) {{
        post({{ type: "renderError", detail: String(error) }});
      }}
    }}

    window.addEventListener("message", (event) => {{
      const message = JSON.parse(event.data);
      if (message.type === "updateMarkdown") {{
        render(message.markdown);
      }}
    }});

    post({{ type: "ready" }});
  </script>
</body>
</html>
"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_markdown(page: &str) -> String {
        // pull the embedded literal back out and parse it as JSON
        let line = page
            .lines()
            .find(|l| l.trim_start().starts_with("const initialMarkdown = "))
            .expect("page embeds the content literal");
        let literal = line
            .trim_start()
            .strip_prefix("const initialMarkdown = ")
            .unwrap()
            .strip_suffix(';')
            .unwrap();
        serde_json::from_str(literal).unwrap()
    }

    #[test]
    fn hostile_content_round_trips_byte_for_byte() {
        let content = "line \"one\"\nback\\slash\r\n</script><script>alert('x')</script>";
        let page = RenderPage::build(content, &[]);
        assert_eq!(page_markdown(&page), content);
    }

    #[test]
    fn dependencies_become_links_and_scripts_in_manifest_order() {
        let deps = vec![
            ("marked.min.js".to_string(), PathBuf::from("/data/dependency/marked.min.js")),
            ("katex.min.css".to_string(), PathBuf::from("/data/dependency/katex.min.css")),
        ];
        let page = RenderPage::build("# hi", &deps);
        assert!(page.contains("<script src=\"/data/dependency/marked.min.js\"></script>"));
        assert!(page.contains("<link rel=\"stylesheet\" href=\"/data/dependency/katex.min.css\">"));
    }

    #[test]
    fn messages_use_the_typed_wire_shape() {
        assert_eq!(
            RendererMessage::from_json(r#"{"type":"ready"}"#).unwrap(),
            RendererMessage::Ready
        );
        assert_eq!(
            RendererMessage::from_json(r#"{"type":"renderError","detail":"boom"}"#).unwrap(),
            RendererMessage::RenderError {
                detail: "boom".to_string()
            }
        );
        assert_eq!(
            HostMessage::UpdateMarkdown {
                markdown: "# hi".to_string()
            }
            .to_json(),
            r##"{"type":"updateMarkdown","markdown":"# hi"}"##
        );
    }

    #[test]
    fn the_happy_path_walks_idle_to_rendered() {
        let mut session = RenderSession::new();
        assert_eq!(session.state(), &RenderState::Idle);

        session.present("# hi".to_string());
        assert_eq!(session.state(), &RenderState::AwaitingReady);

        let reply = session.on_message(RendererMessage::Ready);
        assert_eq!(
            reply,
            Some(HostMessage::UpdateMarkdown {
                markdown: "# hi".to_string()
            })
        );
        assert_eq!(session.state(), &RenderState::AwaitingRenderAck);

        assert_eq!(session.on_message(RendererMessage::RenderOk), None);
        assert_eq!(session.state(), &RenderState::Rendered);
    }

    #[test]
    fn pushing_after_a_save_reenters_awaiting_ack() {
        let mut session = RenderSession::new();
        session.present("v1".to_string());
        session.on_message(RendererMessage::Ready);
        session.on_message(RendererMessage::RenderOk);

        let reply = session.push("v2".to_string());
        assert_eq!(
            reply,
            Some(HostMessage::UpdateMarkdown {
                markdown: "v2".to_string()
            })
        );
        assert_eq!(session.state(), &RenderState::AwaitingRenderAck);
    }

    #[test]
    fn pushing_before_ready_waits_for_the_renderer() {
        let mut session = RenderSession::new();
        session.present("v1".to_string());

        // the user saved again before the renderer came up
        assert_eq!(session.push("v2".to_string()), None);
        let reply = session.on_message(RendererMessage::Ready);
        assert_eq!(
            reply,
            Some(HostMessage::UpdateMarkdown {
                markdown: "v2".to_string()
            })
        );
    }

    #[test]
    fn render_errors_park_the_session_in_failed() {
        let mut session = RenderSession::new();
        session.present("$x$".to_string());
        session.on_message(RendererMessage::Ready);
        session.on_message(RendererMessage::RenderError {
            detail: "katex: unexpected end".to_string(),
        });
        assert!(matches!(session.state(), RenderState::Failed { .. }));

        // a fresh push recovers the session
        assert!(session.push("fixed".to_string()).is_some());
        assert_eq!(session.state(), &RenderState::AwaitingRenderAck);
    }

    #[test]
    fn out_of_order_messages_are_ignored() {
        let mut session = RenderSession::new();
        assert_eq!(session.on_message(RendererMessage::RenderOk), None);
        assert_eq!(session.state(), &RenderState::Idle);

        session.present("v1".to_string());
        assert_eq!(session.on_message(RendererMessage::RenderOk), None);
        assert_eq!(session.state(), &RenderState::AwaitingReady);
    }
}
