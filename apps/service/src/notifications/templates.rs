//! Alert bodies, rendered with Tera.

use serde::Serialize;
use tera::{Context, Tera};

use super::mailer::MailError;

const CHANGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8" /><title>Visual change detected</title></head>
<body style="margin:0;padding:0;background:#eff6ff;font-family:Arial,Helvetica,sans-serif;">
  <table width="100%" cellpadding="0" cellspacing="0" role="presentation" style="background:#eff6ff;padding:32px 0;">
    <tr><td align="center">
      <table width="600" cellpadding="0" cellspacing="0" role="presentation"
             style="background:#ffffff;border-radius:12px;max-width:600px;width:100%;">
        <tr>
          <td style="background:#1d4ed8;padding:24px 32px;">
            <p style="margin:0;font-size:11px;color:#bfdbfe;text-transform:uppercase;">PageWatch</p>
            <h1 style="margin:4px 0 0;font-size:22px;color:#ffffff;">Visual Change Detected</h1>
            <span style="display:inline-block;background:#ffffff;color:{{ score_color }};font-size:20px;font-weight:700;padding:8px 16px;border-radius:8px;">{{ score }}%</span>
          </td>
        </tr>
        <tr>
          <td style="padding:20px 32px 0;">
            <p style="margin:0;font-size:11px;color:#6b7280;text-transform:uppercase;">Monitored page</p>
            <p style="margin:6px 0 0;font-size:15px;word-break:break-all;"><a href="{{ url }}" style="color:#1d4ed8;">{{ url }}</a></p>
          </td>
        </tr>
        <tr>
          <td style="padding:16px 32px 20px;">
            <p style="margin:0;font-size:28px;font-weight:700;color:{{ score_color }};">{{ score }}%</p>
            <p style="margin:2px 0 0;font-size:12px;color:#9ca3af;">0% = identical, 100% = completely different</p>
            <p style="margin:8px 0 0;font-size:15px;color:#111827;">Detected at {{ detected_at }}</p>
          </td>
        </tr>
        {% for image in images %}
        <tr>
          <td style="padding:0 32px 16px;">
            <p style="margin:0 0 8px;font-size:11px;font-weight:700;color:#1d4ed8;text-transform:uppercase;">{{ image.title }}</p>
            {% if image.content_id %}
            <img src="cid:{{ image.content_id }}" alt="{{ image.title }}" width="100%" style="display:block;max-width:560px;border:1px solid #e2e8f0;" />
            {% else %}
            <a href="{{ image.link }}"><img src="{{ image.link }}" alt="{{ image.title }}" width="100%" style="display:block;max-width:560px;border:1px solid #e2e8f0;" /></a>
            {% endif %}
            <p style="margin:6px 0 0;font-size:12px;color:#9ca3af;text-align:center;">{{ image.caption }}</p>
          </td>
        </tr>
        {% endfor %}
        <tr>
          <td style="padding:4px 32px 32px;" align="center">
            <a href="{{ monitor_url }}" style="display:inline-block;background:#1d4ed8;color:#ffffff;font-size:15px;text-decoration:none;padding:12px 32px;border-radius:8px;">Open Monitor Dashboard</a>
          </td>
        </tr>
        <tr>
          <td style="background:#f8fafc;padding:16px 32px;border-top:1px solid #dbeafe;">
            <p style="margin:0;font-size:12px;color:#9ca3af;text-align:center;">You're receiving this because visual change notifications are enabled for this page.</p>
          </td>
        </tr>
      </table>
    </td></tr>
  </table>
</body>
</html>
"#;

const CHANGE_TEXT: &str = "VISUAL CHANGE DETECTED

Page:         {{ url }}
Change score: {{ score }}%  (0% = identical, 100% = completely different)
Detected at:  {{ detected_at }}
{% for image in images %}{{ image.label }}{{ image.link }}
{% endfor %}
Open monitor: {{ monitor_url }}

---
To stop these emails, disable Visual Change Notifications in the page settings.
";

const DOWN_TEXT: &str = "Your monitored page appears to be DOWN.

URL: {{ url }}
Time: {{ time }}
Status: {{ status }}
Message: {{ message }}
Consecutive failures: {{ failures }} (threshold: {{ threshold }})
";

const RECOVERED_TEXT: &str = "Your monitored page is back online.

URL: {{ url }}
Time: {{ time }}
Status: {{ status }}
";

/// Score badge colour: darker for larger changes
pub fn score_color(score: f64) -> &'static str {
    if score >= 20.0 {
        "#1e40af"
    } else if score >= 5.0 {
        "#2563eb"
    } else {
        "#3b82f6"
    }
}

/// An image section of the change email
#[derive(Debug, Clone, Serialize)]
pub struct ImageSection {
    pub title: &'static str,
    pub label: &'static str,
    pub caption: &'static str,
    /// Set when the image is attached inline
    pub content_id: Option<String>,
    /// Fetchable URL, always set
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEmail {
    pub url: String,
    pub score: String,
    pub score_color: &'static str,
    pub detected_at: String,
    pub monitor_url: String,
    pub images: Vec<ImageSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeEmail {
    pub url: String,
    pub time: String,
    pub status: String,
    pub message: String,
    pub failures: u32,
    pub threshold: u32,
}

fn render(template: &str, data: &impl Serialize, autoescape: bool) -> Result<String, MailError> {
    let context = Context::from_serialize(data)?;
    Ok(Tera::one_off(template, &context, autoescape)?)
}

/// Plain-text and HTML bodies of a change email
pub fn render_change(email: &ChangeEmail) -> Result<(String, String), MailError> {
    Ok((render(CHANGE_TEXT, email, false)?, render(CHANGE_HTML, email, true)?))
}

pub fn render_down(email: &UptimeEmail) -> Result<String, MailError> {
    render(DOWN_TEXT, email, false)
}

pub fn render_recovered(email: &UptimeEmail) -> Result<String, MailError> {
    render(RECOVERED_TEXT, email, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_color() {
        assert_eq!(score_color(35.0), "#1e40af");
        assert_eq!(score_color(20.0), "#1e40af");
        assert_eq!(score_color(7.5), "#2563eb");
        assert_eq!(score_color(1.56), "#3b82f6");
    }

    #[test]
    fn test_render_change_email() {
        let email = ChangeEmail {
            url: "https://example.com".to_string(),
            score: "12.5".to_string(),
            score_color: score_color(12.5),
            detected_at: "March 01, 2026 at 10:00 UTC".to_string(),
            monitor_url: "http://localhost:8000/monitor/4".to_string(),
            images: vec![ImageSection {
                title: "Diff Highlight",
                label: "Diff image:   ",
                caption: "Highlighted areas changed since the last screenshot",
                content_id: Some("pw_diff".to_string()),
                link: "http://localhost:8000/api/screenshots/4/a_diff.jpg".to_string(),
            }],
        };

        let (text, html) = render_change(&email).unwrap();
        assert!(text.contains("Change score: 12.5%"));
        assert!(text.contains("Diff image:   http://localhost:8000/api/screenshots/4/a_diff.jpg"));
        assert!(html.contains("cid:pw_diff"));
        assert!(html.contains("#2563eb"));
    }

    #[test]
    fn test_render_down_email() {
        let body = render_down(&UptimeEmail {
            url: "https://example.com".to_string(),
            time: "2026-03-01T10:00:00+00:00".to_string(),
            status: "ERR".to_string(),
            message: "Error: timed out".to_string(),
            failures: 3,
            threshold: 3,
        })
        .unwrap();
        assert!(body.contains("Status: ERR"));
        assert!(body.contains("Consecutive failures: 3 (threshold: 3)"));
    }
}
