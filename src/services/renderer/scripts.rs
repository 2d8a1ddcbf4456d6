//! Page scripts evaluated through the DevTools protocol.
//!
//! Evaluation returns remote objects by reference, so every script yields a
//! primitive (string, number or boolean); structured results are passed
//! back as JSON strings.

use serde::Deserialize;

/// Encode a Rust string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Replace the current (blank) document with `html`.
pub fn set_content(html: &str) -> String {
    format!(
        "(() => {{ document.open(); document.write({}); document.close(); return true; }})()",
        js_string(html)
    )
}

/// Snapshot of the page's load progress.
pub const NETWORK_STATE: &str = r#"JSON.stringify({
    readyState: document.readyState,
    resources: performance.getEntriesByType('resource').length
})"#;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub ready_state: String,
    pub resources: u64,
}

/// True once the page sets `window[name]` to a truthy value.
pub fn ready_flag(name: &str) -> String {
    format!("Boolean(window[{}])", js_string(name))
}

/// Add `class_name` to every element matching `selector`. Yields the number
/// of elements touched, or -1 if the selector does not parse.
pub fn add_class(selector: &str, class_name: &str) -> String {
    format!(
        r#"(() => {{
    let elements;
    try {{
        elements = document.querySelectorAll({selector});
    }} catch (e) {{
        return -1;
    }}
    elements.forEach((el) => el.classList.add({class_name}));
    return elements.length;
}})()"#,
        selector = js_string(selector),
        class_name = js_string(class_name)
    )
}

/// Replace every `<canvas>` with an `<img>` of its current pixels, keeping
/// classes, inline style and size. Tainted canvases cannot be read and are
/// left as they are. Resolves to the number of canvases replaced once the
/// new images have decoded.
pub const SNAPSHOT_CANVASES: &str = r#"(async () => {
    const images = [];
    for (const canvas of Array.from(document.querySelectorAll('canvas'))) {
        let src;
        try {
            src = canvas.toDataURL('image/png');
        } catch (e) {
            continue;
        }
        const img = document.createElement('img');
        img.src = src;
        if (canvas.id) img.id = canvas.id;
        if (canvas.className) img.className = canvas.className;
        const style = canvas.getAttribute('style');
        if (style) img.setAttribute('style', style);
        img.width = canvas.width;
        img.height = canvas.height;
        canvas.replaceWith(img);
        images.push(img);
    }
    await Promise.all(images.map((img) => img.decode().catch(() => undefined)));
    return images.length;
})()"#;

/// Full document size in CSS pixels, as `[width, height]`.
pub const DOCUMENT_SIZE: &str = r#"JSON.stringify([
    Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
    Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
])"#;

/// Serialized DOM after all page mutations.
pub const OUTER_HTML: &str = "document.documentElement.outerHTML";
