//! Email subjects and HTML bodies.

use crate::vigilance::VigilanceStatus;

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Minimal HTML escaping for interpolated text.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a query parameter value (RFC 3986 unreserved set kept).
pub fn encode_query_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Magic login link carrying the same code as the email.
pub fn magic_link(base_url: &str, email: &str, code: &str) -> String {
    format!(
        "{}/api/auth/magic?email={}&code={}",
        base_url.trim_end_matches('/'),
        encode_query_value(email),
        encode_query_value(code)
    )
}

/// Alert sent to every subscriber when the level rises above green.
pub fn vigilance_alert(status: &VigilanceStatus, base_url: &str) -> RenderedEmail {
    let colour = status.color_name.to_uppercase();
    let subject = format!("Vigilance {colour} en cours");

    let phenomena = if status.phenomena.is_empty() {
        String::from("<p>Phénomènes : non précisés dans le bulletin.</p>")
    } else {
        let items: String = status
            .phenomena
            .iter()
            .map(|p| format!("<li>{}</li>", escape_html(p)))
            .collect();
        format!("<p>Phénomènes concernés :</p><ul>{items}</ul>")
    };

    let html = format!(
        "<h1>Vigilance {colour}</h1>\
         <p>Météo France a placé la région en vigilance <strong>{name}</strong> \
         (niveau {level}).</p>\
         {phenomena}\
         <p>Suivez l'évolution sur <a href=\"{url}\">{url}</a> et respectez les \
         consignes des autorités.</p>",
        name = escape_html(status.color_name),
        level = status.color_level,
        url = escape_html(base_url),
    );

    RenderedEmail { subject, html }
}

/// Login code for an existing account, with a one-click link.
pub fn login_code(code: &str, email: &str, base_url: &str, ttl_minutes: i64) -> RenderedEmail {
    let link = magic_link(base_url, email, code);
    RenderedEmail {
        subject: format!("Votre code de connexion VigiMeteo : {code}"),
        html: format!(
            "<p>Votre code de connexion :</p>\
             <p style=\"font-size:24px;letter-spacing:4px\"><strong>{code}</strong></p>\
             <p>Ou connectez-vous directement : <a href=\"{link}\">se connecter</a>.</p>\
             <p>Ce code expire dans {ttl_minutes} minutes. Si vous n'êtes pas à l'origine \
             de cette demande, ignorez cet email.</p>",
            code = escape_html(code),
            link = escape_html(&link),
        ),
    }
}

/// Code confirming a new registration.
pub fn registration_code(code: &str, first_name: &str, ttl_minutes: i64) -> RenderedEmail {
    RenderedEmail {
        subject: "Confirmez votre inscription VigiMeteo".to_string(),
        html: format!(
            "<p>Bonjour {name},</p>\
             <p>Votre code de confirmation : <strong>{code}</strong></p>\
             <p>Il expire dans {ttl_minutes} minutes.</p>",
            name = escape_html(first_name),
            code = escape_html(code),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status(level: i32, phenomena: &[&str]) -> VigilanceStatus {
        VigilanceStatus {
            color_level: level,
            color_name: crate::vigilance::color_name(level),
            phenomena: phenomena.iter().map(ToString::to_string).collect(),
            observed_at: 0,
            raw_bulletin_text: String::new(),
        }
    }

    #[test]
    fn escape_html_handles_markup() {
        assert_eq!(
            escape_html("<b>\"vent\" & 'pluie'</b>"),
            "&lt;b&gt;&quot;vent&quot; &amp; &#39;pluie&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn magic_link_encodes_email() {
        let link = magic_link("https://vigimeteo.fr/", "a+b@example.com", "012345");
        assert_eq!(
            link,
            "https://vigimeteo.fr/api/auth/magic?email=a%2Bb%40example.com&code=012345"
        );
    }

    #[test]
    fn alert_lists_phenomena() {
        let email = vigilance_alert(&status(4, &["vent", "pluie"]), "https://vigimeteo.fr");
        assert_eq!(email.subject, "Vigilance ROUGE en cours");
        assert!(email.html.contains("<li>vent</li><li>pluie</li>"));
        assert!(email.html.contains("niveau 4"));
    }

    #[test]
    fn alert_without_phenomena_says_so() {
        let email = vigilance_alert(&status(2, &[]), "https://vigimeteo.fr");
        assert!(email.html.contains("non précisés"));
    }

    #[test]
    fn login_code_contains_code_and_link() {
        let email = login_code("004217", "alice@example.com", "https://vigimeteo.fr", 10);
        assert!(email.subject.ends_with("004217"));
        assert!(email.html.contains("<strong>004217</strong>"));
        assert!(email.html.contains("email=alice%40example.com&amp;code=004217"));
        assert!(email.html.contains("10 minutes"));
    }

    #[test]
    fn registration_code_escapes_name() {
        let email = registration_code("123456", "<Zoé>", 10);
        assert!(email.html.contains("&lt;Zoé&gt;"));
    }
}
