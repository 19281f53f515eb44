//! HTML pages rendered with minijinja.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use agent_core::Session;
use agent_gateway::{ModelCatalog, ServerEntry};
use axum::response::Html;
use minijinja::{Environment, HtmlEscape, Value, context};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag};

use crate::auth::AuthenticatedUser;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("connect.html", include_str!("../templates/connect.html")),
    ("chat.html", include_str!("../templates/chat.html")),
    ("response.html", include_str!("../templates/response.html")),
    ("add_server.html", include_str!("../templates/add_server.html")),
    ("error.html", include_str!("../templates/error.html")),
];

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_filter("markdown", markdown_filter);
    for &(name, source) in TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            tracing::error!(template = name, error = %e, "Invalid template");
        }
    }
    env
});

/// Render agent output as HTML. Raw HTML in the input is shown as text and
/// links or images with a script-capable scheme lose their target.
pub fn markdown_to_html(text: &str) -> String {
    let events = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH).map(
        |event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            other => other,
        },
    );

    let mut html = String::with_capacity(text.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, events);
    html
}

fn markdown_filter(text: Option<&str>) -> Value {
    Value::from_safe_string(markdown_to_html(text.unwrap_or_default()))
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.contains(['/', '?', '#']));
    match scheme.map(str::to_ascii_lowercase).as_deref() {
        None | Some("http" | "https" | "mailto") => url,
        Some(_) => CowStr::Borrowed("#"),
    }
}

fn render(name: &str, ctx: Value) -> Html<String> {
    let rendered = ENV
        .get_template(name)
        .and_then(|template| template.render(ctx));
    match rendered {
        Ok(html) => Html(html),
        Err(e) => {
            tracing::error!(template = name, error = %e, "Template render failed");
            Html(format!(
                "<!DOCTYPE html><p>Could not render page {}.</p>",
                HtmlEscape(name)
            ))
        }
    }
}

pub fn login_page(message: Option<&str>) -> Html<String> {
    render("login.html", context! { message })
}

pub fn index_page(user: &AuthenticatedUser) -> Html<String> {
    render("index.html", context! { user })
}

pub fn connect_page(
    user: &AuthenticatedUser,
    servers: &BTreeMap<String, ServerEntry>,
    catalog: &ModelCatalog,
    default_server: &str,
) -> Html<String> {
    render(
        "connect.html",
        context! { user, servers, catalog, default_server },
    )
}

pub fn chat_page(user: &AuthenticatedUser, session: &Session) -> Html<String> {
    render("chat.html", context! { user, session })
}

/// The latest exchange is shown separately from the earlier history.
pub fn response_page(user: &AuthenticatedUser, session: &Session) -> Html<String> {
    let (chat_history, latest) = match session.history.split_last() {
        Some((latest, earlier)) => (earlier, Some(latest)),
        None => (&session.history[..], None),
    };
    render(
        "response.html",
        context! {
            user,
            session,
            chat_history,
            query => latest.map(|e| e.query.as_str()),
            response => latest.map(|e| e.response.as_str()),
        },
    )
}

pub fn add_server_page(user: &AuthenticatedUser) -> Html<String> {
    render("add_server.html", context! { user })
}

pub fn error_page(error: &str) -> Html<String> {
    render("error.html", context! { error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::test_user;
    use agent_core::{NewSession, SessionStore};

    #[test]
    fn test_all_templates_compile() {
        for &(name, _) in TEMPLATES {
            assert!(ENV.get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_error_page_escapes() {
        let Html(html) = error_page("<script>alert(1)</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn test_connect_page_lists_servers_and_models() {
        let mut servers = BTreeMap::new();
        servers.insert("Default MCP Server".to_string(), ServerEntry::new("http://localhost:8000/sse"));
        let Html(html) = connect_page(
            &test_user(),
            &servers,
            &ModelCatalog::default(),
            "http://localhost:8000/sse",
        );

        assert!(html.contains("Default MCP Server"));
        // minijinja escapes '/' inside attributes
        assert!(html.contains(r#"value="http:&#x2f;&#x2f;localhost:8000&#x2f;sse" selected"#));
        assert!(html.contains("Llama 3.2 (local)"));
    }

    #[test]
    fn test_markdown_lists_and_code_blocks() {
        let html = markdown_to_html("Tools:\n\n- search\n- fetch\n\n```\nlet x = 1;\n```\n");
        assert!(html.contains("<ul>"));
        assert!(html.contains("<li>search</li>"));
        assert!(html.contains("<pre><code>let x = 1;"));
    }

    #[test]
    fn test_markdown_does_not_pass_through_html() {
        let html = markdown_to_html("hi <script>alert(1)</script>\n\n<img src=x onerror=alert(1)>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;script&gt;"));

        let html = markdown_to_html("[click](javascript:alert(1)) [docs](https://example.com/a:b)");
        assert!(!html.contains("javascript:"));
        assert!(html.contains(r#"href="https://example.com/a:b""#));
    }

    #[tokio::test]
    async fn test_response_page_splits_latest_exchange() {
        let store = SessionStore::new();
        let id = store
            .create(NewSession {
                endpoint: "http://e1/sse".into(),
                region: "local".into(),
                model_id: "llama3.2".into(),
                auth_token: None,
            })
            .await;
        store.record_exchange(&id, "first question", "first answer").await.unwrap();
        store.record_exchange(&id, "second question", "second answer:\n\n* one\n* two").await.unwrap();
        let session = store.get(&id).await.unwrap();

        let Html(html) = response_page(&test_user(), &session);
        let first = html.find("first answer").unwrap();
        let second = html.find("second answer").unwrap();
        assert!(first < second);
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains(session.id.as_str()));
    }
}
