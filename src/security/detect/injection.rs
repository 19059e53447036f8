//! SQL injection detector.

use once_cell::sync::Lazy;

use super::{PatternTier, PayloadDetector, TieredPatterns};

static INJECTION_PATTERNS: Lazy<TieredPatterns> = Lazy::new(|| {
    TieredPatterns::new(
        // basic: tautologies, unions and statement shapes
        &[
            r"(?i)\b(or|and)\s+1\s*=\s*1\b",
            r"(?i)\b(or|and)\s+[0-9]+\s*=\s*[0-9]+",
            r#"(?i)\b(or|and)\s+'[^']{1,255}'\s*=\s*'[^']{1,255}'"#,
            r#"(?i)\b(or|and)\s+"[^"]{1,255}"\s*=\s*"[^"]{1,255}""#,
            r"(?i)\bunion\s+(all\s+)?select\b",
            r"(?i)\bselect\b.+\bfrom\b",
            r"(?i)\binsert\s+into\b",
            r"(?i)\bdelete\s+from\b",
            r"(?i)\b(drop|create|alter|truncate)\s+(table|database)\b",
            r"(?i)\bwaitfor\s+delay\b",
        ],
        // standard: comments, SQL functions and subqueries
        &[
            r"(?s)/\*.*?\*/",
            r"'\s*(--|#)",
            r"(--|#)\s*$",
            r"(?i)\b(db_name|version|ifnull|sleep|benchmark|user)\s*\(",
            r"(?i)\bcase\s+when\b",
            r"(?i)\bexists\s*\(\s*select\b",
            r"(?i)\b(cast|convert)\s*\(",
            r"(?i)\bupdate\b.+\bset\b.*=",
        ],
        // critical: obfuscation, chained statements, schema probing
        &[
            r"(?i)\b(select|insert|update|delete|drop|create|alter|truncate|exec|execute|grant|revoke|declare)\b\s+[\w(*]",
            r"(--|#)",
            r";",
            r"(?i);\s*(select|insert|update|delete|drop|create|alter|truncate)\s+",
            r"(?i)\binformation_schema\b",
            r"(?i)\b(sys|mysql|pg_catalog)\.\w+",
            r"(?i)\bnull\b",
            r"(?i)\bshutdown\b",
            r"(?i)\b(like|regexp)\b",
            r"(?i)\b(if|case)\s*\(",
            r"(?i)\b0x[0-9a-f]{2,32}\b",
            r"(?i)\bx'[0-9a-f]{2,32}'",
            r"(?i)%(27|22|3d|3b|23|2d|2f|5c|25|2c|5b|5d|7b|7d)",
        ],
    )
});

#[derive(Debug, Clone, Copy)]
pub struct InjectionDetector {
    tier: PatternTier,
}

impl InjectionDetector {
    pub fn new(tier: PatternTier) -> Self {
        Self { tier }
    }

    pub fn tier(&self) -> PatternTier {
        self.tier
    }
}

impl PayloadDetector for InjectionDetector {
    fn matches_text(&self, text: &str) -> bool {
        INJECTION_PATTERNS
            .for_tier(self.tier)
            .any(|pattern| pattern.is_match(text))
    }
}
