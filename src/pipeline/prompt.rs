//! Extraction prompt construction from a raw RFC 5322 email.

use mail_parser::MessageParser;

/// Cap on email text sent to the model.
const MAX_BODY_CHARS: usize = 4000;

/// The readable parts of an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDigest {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

/// Parse the raw message. Unparseable input is used verbatim as the body.
pub fn digest_email(raw: &str) -> EmailDigest {
    let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) else {
        return EmailDigest {
            from: None,
            subject: None,
            body: raw.to_string(),
        };
    };

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string());

    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        raw.to_string()
    };

    EmailDigest {
        from,
        subject: parsed.subject().map(|s| s.to_string()),
        body,
    }
}

/// Remove tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the full extraction prompt for one email.
pub fn build_extraction_prompt(email: &EmailDigest) -> String {
    let mut prompt = String::with_capacity(1024 + email.body.len().min(MAX_BODY_CHARS));

    prompt.push_str(
        "You read one email and decide whether it carries a one-time verification code \
         (login code, sign-in code, OTP, password reset code).\n\n\
         Respond with ONLY a JSON object, no prose:\n\
         - no code: {\"codeExist\":0}\n\
         - code found: {\"title\":\"<sender email address>\",\"code\":\"<the code>\",\
         \"topic\":\"<2-5 word label>\",\"classification\":\"LOGIN|PASSWORD_RESET|OTHER\",\
         \"codeExist\":1}\n\n\
         Rules:\n\
         - Copy the code exactly as shown, including leading zeros\n\
         - Use PASSWORD_RESET only for codes that reset or recover a password\n\
         - Links without a code do not count as a code\n\n",
    );

    if let Some(ref from) = email.from {
        prompt.push_str(&format!("From: {from}\n"));
    }
    if let Some(ref subject) = email.subject {
        prompt.push_str(&format!("Subject: {subject}\n"));
    }

    let body: String = email.body.chars().take(MAX_BODY_CHARS).collect();
    prompt.push_str(&format!("\nEmail:\n{body}"));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Example <no-reply@example.com>\r\n\
        To: me@inbox.dev\r\n\
        Subject: Your sign-in code\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Your code is 04 74 22.\r\n";

    const HTML_ONLY: &str = "From: bank@bank.test\r\n\
        Subject: Reset\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <html><body><p>Code:</p><b>991122</b></body></html>\r\n";

    #[test]
    fn digest_plain_message() {
        let digest = digest_email(PLAIN);
        assert_eq!(digest.from.as_deref(), Some("no-reply@example.com"));
        assert_eq!(digest.subject.as_deref(), Some("Your sign-in code"));
        assert!(digest.body.contains("04 74 22"));
    }

    #[test]
    fn digest_html_only_message() {
        let digest = digest_email(HTML_ONLY);
        assert!(digest.body.contains("991122"));
        assert!(!digest.body.contains("<b>"));
    }

    #[test]
    fn strip_html_separates_blocks() {
        assert_eq!(strip_html("<p>Code:</p><b>1234</b>"), "Code: 1234");
        assert_eq!(strip_html("no tags"), "no tags");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn prompt_contains_contract_and_email() {
        let prompt = build_extraction_prompt(&digest_email(PLAIN));
        assert!(prompt.contains("{\"codeExist\":0}"));
        assert!(prompt.contains("PASSWORD_RESET"));
        assert!(prompt.contains("From: no-reply@example.com"));
        assert!(prompt.contains("Subject: Your sign-in code"));
        assert!(prompt.contains("04 74 22"));
    }

    #[test]
    fn prompt_truncates_long_body() {
        let digest = EmailDigest {
            from: None,
            subject: None,
            body: "x".repeat(MAX_BODY_CHARS * 3),
        };
        let prompt = build_extraction_prompt(&digest);
        let (_, body) = prompt.split_once("\nEmail:\n").unwrap();
        assert_eq!(body.chars().count(), MAX_BODY_CHARS);
        assert!(body.chars().all(|c| c == 'x'));
    }
}
