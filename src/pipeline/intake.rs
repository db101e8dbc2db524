//! Email intake: the top-level flow for one inbound email.
//!
//! 1. Idempotency check on the upstream message id
//! 2. Persist the raw message (failure rejects upstream)
//! 3. Build the extraction prompt
//! 4. Extract with retries
//! 5. Repeat gate for sensitive classifications
//! 6. Persist the code
//! 7. Fan out notifications
//!
//! Nothing here returns an error. Every failure is logged and folded into
//! an [`IntakeOutcome`].

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::NotifyConfig;
use crate::error::{DatabaseError, ExtractionError};
use crate::extraction::{ExtractedCode, ExtractionResult};
use crate::llm::Extractor;
use crate::notify::{Notifier, fan_out};
use crate::pipeline::gate::{GateDecision, RepeatGate};
use crate::pipeline::prompt::{build_extraction_prompt, digest_email};
use crate::pipeline::types::{InboundEmail, IntakeOutcome};
use crate::store::{Database, NewCode, RawMessage};

pub struct EmailIntake {
    db: Arc<dyn Database>,
    extractor: Arc<Extractor>,
    gate: RepeatGate,
    notifier: Arc<dyn Notifier>,
    notify: NotifyConfig,
}

impl EmailIntake {
    pub fn new(
        db: Arc<dyn Database>,
        extractor: Arc<Extractor>,
        gate: RepeatGate,
        notifier: Arc<dyn Notifier>,
        notify: NotifyConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            gate,
            notifier,
            notify,
        }
    }

    pub async fn process(&self, email: &InboundEmail) -> IntakeOutcome {
        let id = email.message_id.as_str();

        match self.db.message_exists(id).await {
            Ok(true) => {
                info!(id = %id, "message already processed, skipping");
                return IntakeOutcome::Duplicate;
            }
            Ok(false) => {}
            // The insert below still enforces uniqueness.
            Err(e) => warn!(id = %id, error = %e, "idempotency check failed"),
        }

        let raw = RawMessage {
            message_id: email.message_id.clone(),
            sender: email.from.clone(),
            recipient: email.to.clone(),
            raw: email.raw.clone(),
        };
        match self.db.insert_raw_message(&raw).await {
            Ok(()) => {}
            Err(DatabaseError::Constraint(_)) => {
                info!(id = %id, "concurrent delivery of the same message, skipping");
                return IntakeOutcome::Duplicate;
            }
            Err(e) => {
                error!(id = %id, error = %e, "failed to persist raw message");
                return IntakeOutcome::Rejected;
            }
        }

        let prompt = build_extraction_prompt(&digest_email(&email.raw));

        let extracted = match self.extractor.extract(&prompt).await {
            Ok(ExtractionResult::Code(code)) => code,
            Ok(ExtractionResult::NoCode) => {
                info!(id = %id, "no code in message");
                return IntakeOutcome::NoCode;
            }
            Err(ExtractionError::NoCredentials) => {
                error!(id = %id, "no provider credentials configured, message not processed");
                return IntakeOutcome::ExtractionFailed;
            }
            Err(e) => {
                error!(id = %id, error = %e, "code extraction failed");
                return IntakeOutcome::ExtractionFailed;
            }
        };

        let decision = self
            .gate
            .evaluate(extracted.classification, &email.gate_key(), &extracted.code)
            .await;
        if decision == GateDecision::Suppress {
            info!(id = %id, classification = ?extracted.classification, "code suppressed by repeat gate");
            return IntakeOutcome::Suppressed;
        }

        let row = NewCode {
            message_id: email.message_id.clone(),
            sender: email.from.clone(),
            organization: extracted.sender.clone(),
            recipient: email.to.clone(),
            code: extracted.code.clone(),
            topic: extracted.topic.clone(),
        };
        if let Err(e) = self.db.insert_code(&row).await {
            error!(id = %id, error = %e, "failed to persist code, skipping notification");
            return IntakeOutcome::NotSaved;
        }

        let notified = self.send_notifications(&extracted).await;
        info!(id = %id, topic = %extracted.topic, notified, "code stored");
        IntakeOutcome::Stored { notified }
    }

    async fn send_notifications(&self, code: &ExtractedCode) -> usize {
        if !self.notify.enabled || self.notify.targets.is_empty() {
            return 0;
        }
        let title = format!("{} · {}", code.sender, code.topic);
        fan_out(self.notifier.as_ref(), &self.notify.targets, &title, &code.code).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{
        Credential, CredentialPool, FailoverDispatcher, NormalizedResponse, ProviderClient,
        RetryConfig,
    };
    use crate::notify::tests::RecordingNotifier;
    use crate::pipeline::gate::GateConfig;
    use crate::pipeline::gate::tests::BrokenDb;
    use crate::store::LibSqlBackend;

    /// Always answers with the same text.
    struct FixedClient(String);

    #[async_trait]
    impl ProviderClient for FixedClient {
        async fn call(
            &self,
            _prompt: &str,
            credential: &Credential,
        ) -> Result<NormalizedResponse, LlmError> {
            Ok(NormalizedResponse {
                provider: credential.kind(),
                text: self.0.clone(),
            })
        }
    }

    const LOGIN_REPLY: &str =
        r#"{"codeExist":1,"title":"a@b.com","code":"04 74 22","topic":"login"}"#;
    const RESET_REPLY: &str = r#"{"codeExist":1,"title":"bank","code":"5555","topic":"reset","classification":"PASSWORD_RESET"}"#;

    fn extractor(reply: &str, keys: &[&str]) -> Arc<Extractor> {
        let pool = CredentialPool::new(
            keys.iter()
                .map(|k| Credential::primary(SecretString::from(*k)))
                .collect(),
            None,
        );
        let dispatcher = Arc::new(FailoverDispatcher::new(
            Arc::new(FixedClient(reply.to_string())),
            pool,
        ));
        Arc::new(Extractor::new(
            dispatcher,
            RetryConfig {
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
                ..Default::default()
            },
        ))
    }

    fn intake(
        db: Arc<dyn Database>,
        reply: &str,
        notifier: Arc<RecordingNotifier>,
        targets: &[&str],
    ) -> EmailIntake {
        EmailIntake::new(
            db.clone(),
            extractor(reply, &["k1"]),
            RepeatGate::new(db, GateConfig::default()),
            notifier,
            NotifyConfig {
                enabled: true,
                targets: targets.iter().map(|t| t.to_string()).collect(),
            },
        )
    }

    fn email(id: &str) -> InboundEmail {
        InboundEmail {
            message_id: id.into(),
            from: "forwarder@mail.test".into(),
            to: "Me@Inbox.dev".into(),
            raw: "Subject: code\r\n\r\nYour code is 04 74 22\r\n".into(),
        }
    }

    async fn memory_db() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn stores_normalized_code_and_notifies() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(db.clone(), LOGIN_REPLY, notifier.clone(), &["t1"]);

        let outcome = intake.process(&email("m1")).await;
        assert_eq!(outcome, IntakeOutcome::Stored { notified: 1 });

        let codes = db.recent_codes(10).await.unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "047422");
        assert_eq!(codes[0].organization, "a@b.com");
        assert_eq!(codes[0].sender, "forwarder@mail.test");

        let sent = notifier.sent();
        assert_eq!(sent[0].1, "a@b.com · login");
        assert_eq!(sent[0].2, "047422");
    }

    #[tokio::test]
    async fn same_message_twice_is_processed_once() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(db.clone(), LOGIN_REPLY, notifier.clone(), &["t1"]);

        assert!(matches!(
            intake.process(&email("m1")).await,
            IntakeOutcome::Stored { .. }
        ));
        assert_eq!(intake.process(&email("m1")).await, IntakeOutcome::Duplicate);

        assert_eq!(db.recent_codes(10).await.unwrap().len(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn failing_target_does_not_fail_intake() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::failing(&["t2"]));
        let intake = intake(db.clone(), LOGIN_REPLY, notifier.clone(), &["t1", "t2", "t3"]);

        let outcome = intake.process(&email("m1")).await;
        assert_eq!(outcome, IntakeOutcome::Stored { notified: 2 });
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn disabled_notifications_send_nothing() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let mut intake = intake(db.clone(), LOGIN_REPLY, notifier.clone(), &["t1"]);
        intake.notify.enabled = false;

        let outcome = intake.process(&email("m1")).await;
        assert_eq!(outcome, IntakeOutcome::Stored { notified: 0 });
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn no_code_stores_nothing() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(db.clone(), r#"{"codeExist":0}"#, notifier.clone(), &["t1"]);

        assert_eq!(intake.process(&email("m1")).await, IntakeOutcome::NoCode);
        assert!(db.recent_codes(10).await.unwrap().is_empty());
        assert!(db.message_exists("m1").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_replies_end_in_extraction_failure() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(
            db.clone(),
            r#"{"codeExist":1,"code":"123456"}"#,
            notifier.clone(),
            &["t1"],
        );

        assert_eq!(
            intake.process(&email("m1")).await,
            IntakeOutcome::ExtractionFailed
        );
        assert!(db.recent_codes(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_pool_is_extraction_failure() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let mut intake = intake(db.clone(), LOGIN_REPLY, notifier, &[]);
        intake.extractor = extractor(LOGIN_REPLY, &[]);

        assert_eq!(
            intake.process(&email("m1")).await,
            IntakeOutcome::ExtractionFailed
        );
    }

    #[tokio::test]
    async fn reset_code_released_on_third_repeat() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(db.clone(), RESET_REPLY, notifier.clone(), &["t1"]);

        assert_eq!(intake.process(&email("r1")).await, IntakeOutcome::Suppressed);
        assert_eq!(intake.process(&email("r2")).await, IntakeOutcome::Suppressed);
        assert_eq!(
            intake.process(&email("r3")).await,
            IntakeOutcome::Stored { notified: 1 }
        );
        assert_eq!(db.recent_codes(10).await.unwrap()[0].code, "5555");
    }

    #[tokio::test]
    async fn storage_outage_rejects_upstream() {
        let notifier = Arc::new(RecordingNotifier::default());
        let intake = intake(Arc::new(BrokenDb), LOGIN_REPLY, notifier.clone(), &["t1"]);

        assert_eq!(intake.process(&email("m1")).await, IntakeOutcome::Rejected);
        assert!(notifier.sent().is_empty());
    }
}
