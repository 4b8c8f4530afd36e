//! Page chrome around the routed page.
//!
use super::routes::Page;

const APP_NAME: &str = "facecam";

/// Render a full document with navigation, the page body and the footer.
///
/// `active` marks the navigation link of the current page.
pub fn render(title: &str, active: Option<Page>, body: &str, scripts: &[&str]) -> String {
    let nav: String = Page::ALL
        .iter()
        .map(|page| {
            let class = if Some(*page) == active {
                r#" class="active" aria-current="page""#
            } else {
                ""
            };
            format!(r#"<a href="{}"{class}>{}</a>"#, page.path(), page.title())
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    let scripts: String = scripts
        .iter()
        .map(|src| format!(r#"<script src="{src}" defer></script>"#))
        .collect::<Vec<_>>()
        .join("\n    ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} | {APP_NAME}</title>
    <link rel="stylesheet" href="/assets/app.css">
    {scripts}
</head>
<body>
    <nav class="navbar">
        <span class="brand">{APP_NAME}</span>
        {nav}
    </nav>
    <main>
{body}
    </main>
    <footer>
        <p>Face detection runs on ONNX models served by {APP_NAME} {version}.</p>
    </footer>
</body>
</html>
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_navigation_marks_active_page() {
        let html = render("Image Detection", Some(Page::ImageDetection), "<p>body</p>", &[]);

        assert!(html.contains("<title>Image Detection | facecam</title>"));
        assert!(html.contains(r#"<a href="/webcam-detection">Webcam Detection</a>"#));
        assert!(html.contains(
            r#"<a href="/image-detection" class="active" aria-current="page">Image Detection</a>"#
        ));
        assert!(html.contains("<p>body</p>"));
        assert!(html.contains("<footer>"));
    }

    #[test]
    fn test_scripts_are_included() {
        let html = render("Webcam Detection", None, "", &["/assets/overlay.js"]);
        assert!(html.contains(r#"<script src="/assets/overlay.js" defer></script>"#));
        assert!(!html.contains("class=\"active\""));
    }
}
