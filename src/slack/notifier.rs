//! [`Notifier`] implementation over the Slack send queue.

use std::sync::Arc;

use slack_morphism::prelude::SlackChannelId;

use super::blocks;
use super::client::{SlackMessage, SlackService};
use crate::fleet::BoxFuture;
use crate::notify::Notifier;

/// Posts each report to every recipient channel.
pub struct SlackNotifier {
    slack: Arc<SlackService>,
}

impl SlackNotifier {
    /// Wrap a running Slack service.
    #[must_use]
    pub fn new(slack: Arc<SlackService>) -> Self {
        Self { slack }
    }
}

impl Notifier for SlackNotifier {
    fn send<'a>(
        &'a self,
        recipients: &'a [String],
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for recipient in recipients {
                let message = SlackMessage::plain(SlackChannelId(recipient.clone()), subject)
                    .with_blocks(blocks::report_blocks(subject, body));
                self.slack.enqueue(message).await?;
            }
            Ok(())
        })
    }
}
