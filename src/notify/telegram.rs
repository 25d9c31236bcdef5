//! Telegram notification channel.
//!
//! Delivers messages through the Bot API `sendMessage` endpoint with
//! Markdown formatting, in the same Dutch wording subscribers see on
//! the other end of the original bot.

use async_trait::async_trait;
use serde_json::json;

use crate::models::{ChangeEvent, ChangeKind, CycleSummary, TelegramConfig};
use crate::notify::{NotifyChannel, NotifyError};

pub struct TelegramChannel {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }

    fn api_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.token)
    }

    /// Map an HTTP status to retryability: rate limiting and server-side
    /// trouble are worth another attempt, the rest is not.
    fn classify_status(status: reqwest::StatusCode) -> NotifyError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            NotifyError::Transient(format!("telegram returned {status}"))
        } else {
            NotifyError::Permanent(format!("telegram returned {status}"))
        }
    }

    fn event_title(event: &ChangeEvent) -> &'static str {
        match event.kind {
            ChangeKind::New => {
                if event.current.as_ref().is_some_and(|l| l.relisted) {
                    "\u{1f501} *Opnieuw aangeboden woning*"
                } else {
                    "\u{1f3e0} *Nieuwe woning*"
                }
            }
            ChangeKind::Updated => "\u{1f504} *Gewijzigde woning*",
            ChangeKind::Removed => "\u{274c} *Verwijderde woning*",
        }
    }
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn format_event(&self, event: &ChangeEvent) -> String {
        use crate::models::ListingField;

        let listing = event.subject();
        let mut message = format!("{}\n\n", Self::event_title(event));
        message.push_str(&format!("*{}*\n{}\n\n", listing.address, listing.city));
        message.push_str(&format!(
            "*Prijs:* {}\n",
            listing.field_value(ListingField::Price)
        ));
        message.push_str(&format!(
            "*Oppervlakte:* {}\n",
            listing.field_value(ListingField::AreaM2)
        ));
        if let Some(kind) = &listing.property_type {
            message.push_str(&format!("*Type:* {kind}\n"));
        }

        // One line per changed field, old value first
        if event.kind == ChangeKind::Updated {
            if let Some(previous) = &event.previous {
                message.push_str("\n*Wijzigingen:*\n");
                for field in &event.changed {
                    message.push_str(&format!(
                        "- {}: {} \u{2192} {}\n",
                        field.label(),
                        previous.field_value(*field),
                        listing.field_value(*field)
                    ));
                }
            }
        }

        message.push_str(&format!("\n[Bekijk op website]({})", listing.url));
        message
    }

    fn format_summary(&self, summary: &CycleSummary) -> String {
        let total = summary.total_changes();
        let mut message = "\u{1f3e0} *Huizenzoeker Samenvatting*\n\n".to_string();

        if total == 0 {
            message.push_str("Geen wijzigingen gevonden.");
        } else {
            message.push_str(&format!("Totaal {total} wijzigingen gevonden:\n"));
            message.push_str(&format!("- {} nieuwe woningen\n", summary.new));
            message.push_str(&format!("- {} gewijzigde woningen\n", summary.updated));
            message.push_str(&format!("- {} verwijderde woningen", summary.removed));
        }

        let failed: Vec<&str> = summary
            .failed_sources()
            .map(|s| s.source_id.as_str())
            .collect();
        if !failed.is_empty() {
            message.push_str(&format!(
                "\n\n\u{26a0} Mislukte bronnen: {}",
                failed.join(", ")
            ));
        }
        if summary.undelivered > 0 {
            message.push_str(&format!(
                "\n\u{26a0} {} meldingen niet afgeleverd",
                summary.undelivered
            ));
        }
        message
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.api_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::classify_status(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Listing, ListingField, ListingStatus};
    use chrono::Utc;

    fn channel() -> TelegramChannel {
        TelegramChannel::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            ..TelegramConfig::default()
        })
    }

    fn listing(price: Option<i64>) -> Listing {
        Listing {
            source_id: "ooms".to_string(),
            external_id: "grachtweg-12".to_string(),
            address: "Grachtweg 12".to_string(),
            city: "Rotterdam".to_string(),
            price,
            area_m2: Some(75),
            property_type: Some("Appartement".to_string()),
            url: "https://www.ooms.com/woningaanbod/grachtweg-12".to_string(),
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            status: ListingStatus::Active,
            relisted: false,
        }
    }

    #[test]
    fn test_format_new_event() {
        let message = channel().format_event(&ChangeEvent::new_listing(
            listing(Some(150_000)),
            Utc::now(),
        ));

        assert!(message.contains("*Nieuwe woning*"));
        assert!(message.contains("*Grachtweg 12*"));
        assert!(message.contains("Rotterdam"));
        assert!(message.contains("\u{20ac} 150.000"));
        assert!(message.contains("75 m\u{b2}"));
        assert!(message.contains("(https://www.ooms.com/woningaanbod/grachtweg-12)"));
    }

    #[test]
    fn test_format_updated_event_shows_diff() {
        let previous = listing(Some(150_000));
        let current = listing(Some(140_000));
        let message = channel().format_event(&ChangeEvent::updated(
            previous,
            current,
            vec![ListingField::Price],
            Utc::now(),
        ));

        assert!(message.contains("*Gewijzigde woning*"));
        assert!(message.contains("Prijs: \u{20ac} 150.000 \u{2192} \u{20ac} 140.000"));
    }

    #[test]
    fn test_format_price_on_request() {
        let message = channel().format_event(&ChangeEvent::new_listing(listing(None), Utc::now()));
        assert!(message.contains("prijs op aanvraag"));
        assert!(!message.contains("\u{20ac} 0"));
    }

    #[test]
    fn test_format_relisted_event() {
        let mut relisted = listing(Some(150_000));
        relisted.relisted = true;
        let message =
            channel().format_event(&ChangeEvent::new_listing(relisted, Utc::now()));
        assert!(message.contains("Opnieuw aangeboden"));
    }

    #[test]
    fn test_format_summary_with_changes_and_failures() {
        let summary = CycleSummary {
            started_at: Utc::now(),
            duration_ms: 1200,
            new: 2,
            updated: 1,
            removed: 0,
            undelivered: 1,
            cancelled: false,
            sources: vec![crate::models::SourceReport::failed(
                "klipenvw",
                "timeout".to_string(),
                5000,
            )],
        };
        let message = channel().format_summary(&summary);

        assert!(message.contains("Totaal 3 wijzigingen"));
        assert!(message.contains("2 nieuwe woningen"));
        assert!(message.contains("Mislukte bronnen: klipenvw"));
        assert!(message.contains("1 meldingen niet afgeleverd"));
    }

    #[test]
    fn test_format_summary_no_changes() {
        let summary = CycleSummary {
            started_at: Utc::now(),
            duration_ms: 800,
            new: 0,
            updated: 0,
            removed: 0,
            undelivered: 0,
            cancelled: false,
            sources: Vec::new(),
        };
        assert!(channel()
            .format_summary(&summary)
            .contains("Geen wijzigingen gevonden."));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            TelegramChannel::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            NotifyError::Transient(_)
        ));
        assert!(matches!(
            TelegramChannel::classify_status(reqwest::StatusCode::BAD_GATEWAY),
            NotifyError::Transient(_)
        ));
        assert!(matches!(
            TelegramChannel::classify_status(reqwest::StatusCode::UNAUTHORIZED),
            NotifyError::Permanent(_)
        ));
    }
}
