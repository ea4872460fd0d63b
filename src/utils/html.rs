use ammonia;

/// Clean HTML content using the ammonia library.
///
/// This employs a whitelist-based sanitization strategy: it preserves safe tags
/// (like <b>, <p>) while stripping dangerous tags (like <script>, <iframe>)
/// and malicious attributes (like onclick).
///
/// Question banks arrive from an external extraction pipeline, so every text
/// field is passed through here before a typed record leaves the bank
/// boundary. This serves as a fail-safe against Stored XSS in clients that
/// render question text as HTML.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
