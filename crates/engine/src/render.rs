//! Assignment email rendering.

use deckmail_common::types::CardDetails;

/// Subject line for every assignment email.
pub const ASSIGNMENT_SUBJECT: &str = "You have been assigned a new card";

/// A rendered email, ready for the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
}

/// Deep link to a card in the Deck web UI.
pub fn card_url(base_url: &str, details: &CardDetails) -> String {
    format!(
        "{}/index.php/apps/deck/#/board/{}/card/{}",
        base_url.trim_end_matches('/'),
        details.board_id,
        details.card_id
    )
}

/// Render the notification telling `participant` about their new card.
///
/// Every interpolated value is HTML-escaped; line breaks in the
/// description are preserved.
pub fn render_assignment_email(
    participant: &str,
    details: &CardDetails,
    base_url: &str,
) -> RenderedEmail {
    let description = details
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| escape_html(d).replace('\n', "<br>\n"))
        .unwrap_or_else(|| "<em>No description</em>".to_string());

    let html_body = format!(
        r#"<html>
<body>
<p>Hello {participant},</p>

<p>You have been assigned to the card "<strong>{title}</strong>" in the stack "<strong>{stack}</strong>" on the board "<strong>{board}</strong>".</p>

<p><strong>Description:</strong><br>
{description}</p>

<p>You can view the card <a href="{url}">here</a>.</p>

<p>Best regards,<br>
Your Team</p>
</body>
</html>
"#,
        participant = escape_html(participant),
        title = escape_html(&details.title),
        stack = escape_html(&details.stack_title),
        board = escape_html(&details.board_title),
        description = description,
        url = escape_html(&card_url(base_url, details)),
    );

    RenderedEmail {
        subject: ASSIGNMENT_SUBJECT.to_string(),
        html_body,
    }
}

fn escape_html(input: &str) -> String {
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
