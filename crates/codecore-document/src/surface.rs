//! Capture-sink surfaces
//!
//! [`SurfaceLayout`] owns the element ids of the error panel and the console
//! panel. The same ids are used by the markup, the stylesheet and the
//! instrumentation, so they are defined in one place.

use codecore_profile::StylingRules;

/// Element ids of the two capture panels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLayout {
    /// Error panel id, hidden until the first error
    pub error_id: String,
    /// Console panel id, always visible
    pub console_id: String,
}

impl Default for SurfaceLayout {
    fn default() -> Self {
        Self {
            error_id: "error".to_string(),
            console_id: "console".to_string(),
        }
    }
}

impl SurfaceLayout {
    /// Panel markup, error panel hidden
    #[must_use]
    pub fn markup(&self) -> String {
        format!(
            "<div id=\"{}\" style=\"display:none;\"></div>\n<div id=\"{}\"></div>\n",
            self.error_id, self.console_id
        )
    }

    /// Stylesheet for page body and both panels
    #[must_use]
    pub fn stylesheet(&self, styling: &StylingRules) -> String {
        format!(
            "body {{ {} }}\n#{} {{ {} }}\n#{} {{ {} }}\n",
            styling.body, self.error_id, styling.error_panel, self.console_id, styling.console_panel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_hides_error_panel() {
        let markup = SurfaceLayout::default().markup();
        assert!(markup.contains("<div id=\"error\" style=\"display:none;\"></div>"));
        assert!(markup.contains("<div id=\"console\"></div>"));
    }

    #[test]
    fn stylesheet_uses_layout_ids() {
        let layout = SurfaceLayout {
            error_id: "cc-error".to_string(),
            console_id: "cc-console".to_string(),
        };
        let css = layout.stylesheet(&StylingRules {
            body: "margin: 0;".to_string(),
            error_panel: "color: red;".to_string(),
            console_panel: "color: green;".to_string(),
        });
        assert!(css.contains("body { margin: 0; }"));
        assert!(css.contains("#cc-error { color: red; }"));
        assert!(css.contains("#cc-console { color: green; }"));
    }
}
