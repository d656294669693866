use pulldown_cmark::{html, Event, Options, Parser};

/// Render chat text as Markdown, returning HTML that is safe to embed.
///
/// Raw HTML in the source is shown as text rather than interpreted, and the
/// output is passed through ammonia so only whitelisted tags and attributes
/// reach the page.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut rendered = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut rendered, events);
    ammonia::clean(&rendered)
}
