//! Bodies of the routed pages.
//!
use super::routes::Page;

const WEBCAM_BODY: &str = r#"        <section class="page webcam-detection">
            <h1>Webcam Detection</h1>
            <label class="toggle">
                <input type="checkbox" id="webcam-toggle">
                <span id="webcam-state">Start webcam</span>
            </label>
            <div class="stage">
                <video id="video" autoplay muted playsinline></video>
                <canvas id="overlay"></canvas>
            </div>
            <section id="server-camera" class="server-camera" hidden>
                <h2>Server camera</h2>
                <label class="toggle">
                    <input type="checkbox" id="server-camera-toggle">
                    <span>Stream from the camera attached to the server</span>
                </label>
                <img id="server-camera-stream" alt="Annotated server camera stream" hidden>
            </section>
        </section>"#;

const IMAGE_BODY: &str = r#"        <section class="page image-detection">
            <h1>Image Detection</h1>
            <form id="image-form" action="/api/annotate" method="post" enctype="multipart/form-data">
                <input type="file" id="image-input" name="image" accept="image/*">
                <button type="submit">Annotate on server</button>
            </form>
            <p id="image-status" class="status"></p>
            <div class="stage">
                <img id="image" alt="">
                <canvas id="overlay"></canvas>
            </div>
        </section>"#;

/// Body markup of a page.
pub fn body(page: Page) -> &'static str {
    match page {
        Page::WebcamDetection => WEBCAM_BODY,
        Page::ImageDetection => IMAGE_BODY,
    }
}

/// Scripts a page needs, in load order.
pub fn scripts(page: Page) -> &'static [&'static str] {
    match page {
        Page::WebcamDetection => &["/assets/overlay.js", "/assets/webcam.js"],
        Page::ImageDetection => &["/assets/overlay.js", "/assets/image.js"],
    }
}
