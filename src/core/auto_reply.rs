//! Automatic replies to new reviews.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::credentials::CredentialResolver;
use crate::adapters::{ProfileApi, TextGenerator, TextGeneratorSource};
use crate::domain::{Location, Platform, ReplySource, Review};
use crate::error::IntegrationError;
use crate::store::Store;

const SYSTEM_PROMPT: &str = "You are the owner of a local business replying to a customer \
review. Write a short, warm, specific reply in the language of the review. Do not use \
placeholders or sign with a name. Reply with the text only.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoReplyReport {
    pub locations: usize,
    pub replied: usize,
    pub failed: usize,
    /// Locations skipped for lack of a profile or text-generation credential
    pub skipped: usize,
}

pub struct AutoReplier {
    store: Arc<Store>,
    resolver: Arc<CredentialResolver>,
    api: Arc<dyn ProfileApi>,
    text: Arc<dyn TextGeneratorSource>,
    per_cycle_cap: usize,
}

impl AutoReplier {
    pub fn new(
        store: Arc<Store>,
        resolver: Arc<CredentialResolver>,
        api: Arc<dyn ProfileApi>,
        text: Arc<dyn TextGeneratorSource>,
        per_cycle_cap: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            api,
            text,
            per_cycle_cap,
        }
    }

    /// One cycle over every location with auto-reply enabled
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<AutoReplyReport, IntegrationError> {
        let mut report = AutoReplyReport::default();

        for location in self.store.auto_reply_locations()? {
            report.locations += 1;
            match self.run_location(&location).await {
                Ok((replied, failed)) => {
                    report.replied += replied;
                    report.failed += failed;
                }
                Err(IntegrationError::Store(e)) => return Err(IntegrationError::Store(e)),
                Err(e) => {
                    warn!(location_id = %location.id, error = %e, "Skipping auto-reply for location");
                    report.skipped += 1;
                }
            }
        }

        info!(
            replied = report.replied,
            failed = report.failed,
            skipped = report.skipped,
            "Auto-reply cycle finished"
        );
        Ok(report)
    }

    async fn run_location(&self, location: &Location) -> Result<(usize, usize), IntegrationError> {
        let reviews =
            self.store
                .unreplied_reviews(&location.id, location.auto_reply.since, self.per_cycle_cap)?;
        if reviews.is_empty() {
            return Ok((0, 0));
        }

        let credential = self.resolver.resolve(location, Platform::Google).await?;

        let organization_key = match &location.organization_id {
            Some(org) => self.store.text_generation_key(org)?,
            None => None,
        };
        let generator = self
            .text
            .for_key(organization_key.as_deref())
            .ok_or_else(|| {
                IntegrationError::Permanent("no text-generation key configured".to_string())
            })?;

        let (mut replied, mut failed) = (0, 0);
        for review in &reviews {
            match self
                .reply_one(location, review, generator.as_ref(), &credential)
                .await
            {
                Ok(()) => replied += 1,
                Err(IntegrationError::Store(e)) => return Err(IntegrationError::Store(e)),
                Err(e) => {
                    warn!(review_id = %review.id, error = %e, "Auto-reply failed");
                    failed += 1;
                }
            }
        }

        Ok((replied, failed))
    }

    async fn reply_one(
        &self,
        location: &Location,
        review: &Review,
        generator: &dyn TextGenerator,
        credential: &crate::domain::Credential,
    ) -> Result<(), IntegrationError> {
        let prompt = review_prompt(location, review);
        let reply = generator.generate(SYSTEM_PROMPT, &prompt).await?;

        self.api
            .reply_review(credential, &review.external_id, &reply)
            .await?;
        self.store
            .record_review_reply(&review.id, &reply, Utc::now(), ReplySource::Auto)?;

        info!(review_id = %review.id, rating = review.rating, "Auto-replied to review");
        Ok(())
    }
}

fn review_prompt(location: &Location, review: &Review) -> String {
    format!(
        "Business: {}\nReviewer: {}\nRating: {}/5\nReview: {}",
        location.display.display_name.as_deref().unwrap_or("our business"),
        review.reviewer_name.as_deref().unwrap_or("a customer"),
        review.rating,
        review
            .comment
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("(rating only, no text)"),
    )
}
