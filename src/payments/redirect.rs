//! Auto-submitting HTML form that hands the browser over to the bank.

use crate::payments::types::AuthenticationArtifact;

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Field values are posted exactly as given; escaping only protects the
/// markup, the browser decodes it back to the signed bytes.
pub fn auto_submit_form(action: &str, fields: Vec<(String, String)>) -> AuthenticationArtifact {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>3-D Secure</title></head>\n\
         <body onload=\"document.forms[0].submit()\">\n",
    );
    html.push_str(&format!(
        "<form method=\"post\" action=\"{}\">\n",
        escape_html(action)
    ));
    for (name, value) in &fields {
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
            escape_html(name),
            escape_html(value)
        ));
    }
    html.push_str("<noscript><button type=\"submit\">Continue</button></noscript>\n</form>\n</body>\n</html>\n");

    AuthenticationArtifact::AutoSubmitForm {
        action: action.to_string(),
        fields,
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_escaped_in_markup_but_kept_raw_in_fields() {
        let artifact = auto_submit_form(
            "https://bank.example/fim/est3Dgate",
            vec![
                ("okUrl".to_string(), "https://shop/cb?a=1&b=2".to_string()),
                ("hash".to_string(), "ab+/\"<x>'==".to_string()),
            ],
        );
        let AuthenticationArtifact::AutoSubmitForm { fields, html, .. } = artifact else {
            panic!("expected a form");
        };
        assert_eq!(fields[1].1, "ab+/\"<x>'==");
        assert!(html.contains("value=\"https://shop/cb?a=1&amp;b=2\""));
        assert!(html.contains("value=\"ab+/&quot;&lt;x&gt;&#x27;==\""));
        assert!(!html.contains("<x>"));
        assert!(html.contains("action=\"https://bank.example/fim/est3Dgate\""));
    }
}
