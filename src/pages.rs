use axum::response::Html;

use crate::admin::AdminView;

/// Minimal document shell. Page content is static presentation served by the frontend;
/// these placeholders only give each route a body to render.
pub fn render(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\
         <html lang=\"en\"><head><meta charset=\"utf-8\"><title>{title} | Peerly</title></head>\
         <body><main data-page=\"{title}\">{body}</main></body></html>"
    ))
}

pub fn loading() -> Html<String> {
    render("Loading", "<div role=\"status\" aria-busy=\"true\">Loading…</div>")
}

pub fn admin(view: &AdminView) -> Html<String> {
    match view {
        AdminView::Loading => loading(),
        AdminView::Authorized => render("Admin", "<h1>Verification queue</h1>"),
        AdminView::Denied {
            home_href,
            signed_in_as,
        } => render(
            "Access denied",
            &format!(
                "<h1>Access denied</h1>\
                 <p>Signed in as {}</p>\
                 <a href=\"{home_href}\">Back to home</a>",
                escape(signed_in_as)
            ),
        ),
    }
}

/// Escapes text for inclusion in HTML bodies and attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
