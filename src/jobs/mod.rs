//! Built-In Job Families
//!
//! Media processing, email sending, and webhook delivery, registered on
//! the worker like any other job; none has a special path through the
//! queue.
//!
//! Job bodies receive their collaborators through captured handles at
//! registration time, mirroring how request handlers receive state.

pub mod email;
pub mod media;
pub mod webhook;

pub use email::{LogMailer, Mailer, OutgoingEmail};
pub use media::{MediaProcessor, PassthroughProcessor};

use std::sync::Arc;

use crate::queue::{JobQueue, JobRegistry};
use crate::webhooks::WebhookService;

/// Shared handles captured by the built-in job closures
#[derive(Clone)]
pub struct JobDependencies {
    pub queue: Arc<JobQueue>,
    pub webhooks: Arc<WebhookService>,
    pub mailer: Arc<dyn Mailer>,
    pub processor: Arc<dyn MediaProcessor>,
}

/// Register every built-in job family on a registry
pub fn register_builtin(registry: &mut JobRegistry, deps: JobDependencies) {
    {
        let deps = deps.clone();
        registry.register("process_media", move |ctx, args| {
            let deps = deps.clone();
            async move { media::process_media(ctx, args, deps).await }
        });
    }
    {
        let deps = deps.clone();
        registry.register("generate_thumbnail", move |ctx, args| {
            let deps = deps.clone();
            async move { media::generate_thumbnail(ctx, args, deps).await }
        });
    }
    {
        let deps = deps.clone();
        registry.register("send_single_email", move |ctx, args| {
            let deps = deps.clone();
            async move { email::send_single_email(ctx, args, deps).await }
        });
    }
    {
        let deps = deps.clone();
        registry.register("send_bulk_emails", move |ctx, args| {
            let deps = deps.clone();
            async move { email::send_bulk_emails(ctx, args, deps).await }
        });
    }
    {
        let deps = deps.clone();
        registry.register("deliver_webhook", move |ctx, args| {
            let deps = deps.clone();
            async move { webhook::deliver_webhook(ctx, args, deps).await }
        });
    }
}
