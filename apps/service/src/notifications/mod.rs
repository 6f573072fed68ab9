/// Alert decisions
///
/// After every check the trigger decides whether a downtime, recovery or
/// visual-change alert is due and hands the message to the injected mailer.
/// Nothing here fails a check: errors are logged and dropped.
pub mod mailer;
pub mod templates;

pub use mailer::{InlineImage, LogMailer, MailError, MailMessage, Mailer};

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::NotificationSettings;
use crate::database::{CheckResult, Database, MonitoredPage};
use crate::storage::ArtifactStore;
use templates::{ChangeEmail, ImageSection, UptimeEmail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeAlert {
    Recovered,
    Down { failures: u32, threshold: u32 },
}

/// Downtime/recovery decision for the newest check of a page.
///
/// `previous` is the check before `latest`; `failures` the trailing down streak.
pub fn decide_uptime(
    page: &MonitoredPage,
    latest: &CheckResult,
    previous: Option<&CheckResult>,
    failures: u32,
) -> Option<UptimeAlert> {
    if !page.notifications_enabled {
        return None;
    }

    if latest.is_up {
        return previous.filter(|prev| !prev.is_up).map(|_| UptimeAlert::Recovered);
    }

    let threshold = page.alert_threshold;
    // Only the check that completes the streak alerts
    (threshold > 0 && failures == threshold).then_some(UptimeAlert::Down { failures, threshold })
}

/// Whether the newest check should raise a visual-change alert
pub fn is_visual_change(page: &MonitoredPage, latest: &CheckResult) -> bool {
    page.change_notifications_enabled && page.screenshot_enabled && latest.diff_score.is_some_and(|score| score > 0.0)
}

pub struct NotificationTrigger {
    database: Arc<dyn Database>,
    store: Arc<dyn ArtifactStore>,
    mailer: Arc<dyn Mailer>,
    settings: NotificationSettings,
}

impl NotificationTrigger {
    pub fn new(
        database: Arc<dyn Database>,
        store: Arc<dyn ArtifactStore>,
        mailer: Arc<dyn Mailer>,
        settings: NotificationSettings,
    ) -> Self {
        Self { database, store, mailer, settings }
    }

    fn site_base(&self) -> &str {
        self.settings.site_base_url.trim_end_matches('/')
    }

    /// Run both alert decisions for a freshly stored check
    pub async fn process(&self, page: &MonitoredPage, latest: &CheckResult) {
        if let Err(e) = self.process_uptime(page, latest).await {
            error!("Uptime notification for page {} failed: {}", page.id, e);
        }
        if let Err(e) = self.process_change(page, latest).await {
            error!("Change notification for page {} failed: {}", page.id, e);
        }
    }

    async fn recipient(&self, page: &MonitoredPage, kind: &str) -> Result<Option<String>> {
        let email = self.database.owner_email(&page.owner_id).await?;
        if email.is_none() {
            warn!("{} notification skipped for page {}: owner has no email address", kind, page.url);
        }
        Ok(email)
    }

    async fn deliver(&self, message: MailMessage) {
        info!("Sending '{}' to {}", message.subject, message.to);
        if let Err(e) = self.mailer.send(&message).await {
            error!("Failed to send '{}' to {}: {}", message.subject, message.to, e);
        }
    }

    async fn process_uptime(&self, page: &MonitoredPage, latest: &CheckResult) -> Result<()> {
        if !page.notifications_enabled {
            return Ok(());
        }

        let (previous, failures) = if latest.is_up {
            (self.database.previous_result(page.id, latest.id).await?, 0)
        } else {
            (None, self.database.consecutive_failures(page.id).await?)
        };

        let Some(alert) = decide_uptime(page, latest, previous.as_ref(), failures) else {
            return Ok(());
        };
        let Some(to) = self.recipient(page, "Uptime").await? else {
            return Ok(());
        };

        let status = latest.status_code.map(|code| code.to_string());
        let (subject, text_body) = match alert {
            UptimeAlert::Recovered => {
                let email = UptimeEmail {
                    url: page.url.clone(),
                    time: latest.checked_at.to_rfc3339(),
                    status: status.unwrap_or_else(|| "None".to_string()),
                    message: latest.message.clone(),
                    failures: 0,
                    threshold: page.alert_threshold,
                };
                (format!("Webpage RECOVERED: {}", page.url), templates::render_recovered(&email)?)
            }
            UptimeAlert::Down { failures, threshold } => {
                let message = if latest.message.is_empty() { "Unknown error".to_string() } else { latest.message.clone() };
                let email = UptimeEmail {
                    url: page.url.clone(),
                    time: latest.checked_at.to_rfc3339(),
                    status: status.unwrap_or_else(|| "ERR".to_string()),
                    message,
                    failures,
                    threshold,
                };
                (format!("Webpage DOWN alert: {}", page.url), templates::render_down(&email)?)
            }
        };

        self.deliver(MailMessage {
            from: self.settings.from_address.clone(),
            to,
            subject,
            text_body,
            html_body: None,
            inline_images: Vec::new(),
        })
        .await;
        Ok(())
    }

    /// Inline the image when the store exposes the file directly, else link it
    async fn image_section(
        &self,
        path: &str,
        title: &'static str,
        label: &'static str,
        caption: &'static str,
        inline: &mut Vec<InlineImage>,
    ) -> Option<ImageSection> {
        if path.is_empty() {
            return None;
        }

        let url = self.store.url(path).await;
        let link = if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("{}{}", self.site_base(), url)
        };

        let mut content_id = None;
        if let Some(artifact) = self.store.local_access(path).await {
            if !artifact.is_transient() {
                match tokio::fs::read(artifact.path()).await {
                    Ok(data) => {
                        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
                        let stem = filename.trim_end_matches(".jpg");
                        let cid = format!("pw_{stem}");
                        inline.push(InlineImage { content_id: cid.clone(), filename, data });
                        content_id = Some(cid);
                    }
                    Err(e) => warn!("Failed to attach inline image {}: {}", path, e),
                }
            }
            artifact.release();
        }

        Some(ImageSection { title, label, caption, content_id, link })
    }

    async fn process_change(&self, page: &MonitoredPage, latest: &CheckResult) -> Result<()> {
        if !is_visual_change(page, latest) {
            return Ok(());
        }
        let Some(to) = self.recipient(page, "Visual change").await? else {
            return Ok(());
        };

        let score = latest.diff_score.unwrap_or_default();
        let mut inline_images = Vec::new();
        let mut images = Vec::new();
        if let Some(section) = self
            .image_section(
                &latest.diff_path,
                "Diff Highlight",
                "Diff image:   ",
                "Highlighted areas changed since the last screenshot",
                &mut inline_images,
            )
            .await
        {
            images.push(section);
        }
        if let Some(section) = self
            .image_section(
                &latest.screenshot_path,
                "Full Screenshot",
                "Screenshot:   ",
                "The full page screenshot captured at the time of detection",
                &mut inline_images,
            )
            .await
        {
            images.push(section);
        }

        let email = ChangeEmail {
            url: page.url.clone(),
            score: format!("{score:.1}"),
            score_color: templates::score_color(score),
            detected_at: latest.checked_at.format("%B %d, %Y at %H:%M UTC").to_string(),
            monitor_url: format!("{}/monitor/{}", self.site_base(), page.id),
            images,
        };
        let (text_body, html_body) = templates::render_change(&email)?;

        self.deliver(MailMessage {
            from: self.settings.from_address.clone(),
            to,
            subject: format!("Visual change detected on {} ({score:.1}%)", page.url),
            text_body,
            html_body: Some(html_body),
            inline_images,
        })
        .await;
        Ok(())
    }
}
