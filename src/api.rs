//! Endpoint methods, one per REST resource and action.
//!
//! Each method fills its path template, layers its named optional parameters
//! over the caller's [`CallOptions::query`] and hands the call to
//! [`PipedreamClient::execute`]. Pagination, retries and response selection
//! are configured through [`CallOptions`].

use crate::{Body, Call, CallOptions, Output, PipedreamClient, Result};

/// Optional parameters of [`PipedreamClient::auto_subscription_create`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoSubscriptionQuery {
    pub event_name: Option<String>,
    pub listener_id: Option<String>,
}

/// Optional parameters of the event summary endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventSummariesQuery {
    /// Pass `"event"` to include full event payloads.
    pub expand: Option<String>,
    pub limit: Option<u32>,
}

/// Optional parameters of the subscription endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionQuery {
    pub emitter_id: Option<String>,
    pub event_name: Option<String>,
    pub listener_id: Option<String>,
}

/// Optional parameters of [`PipedreamClient::webhook_create`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookQuery {
    pub description: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

impl PipedreamClient {
    /// Subscribes a listener to an emitter's events automatically.
    pub async fn auto_subscription_create(
        &mut self,
        body: impl Into<Body>,
        query: AutoSubscriptionQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::post("/auto_subscriptions", body)
            .with_options(options)
            .layer("event_name", query.event_name)
            .layer("listener_id", query.listener_id);
        self.execute(call).await
    }

    /// Publishes a component from its source code.
    pub async fn component_create(
        &mut self,
        body: impl Into<Body>,
        options: CallOptions,
    ) -> Result<Output> {
        self.execute(Call::post("/components", body).with_options(options))
            .await
    }

    /// Fetches a component by ID.
    pub async fn component_show(&mut self, id: &str, options: CallOptions) -> Result<Output> {
        self.execute(Call::get(format!("/components/{id}")).with_options(options))
            .await
    }

    /// Fetches a component from the public registry by key.
    pub async fn components_registry_show(
        &mut self,
        key: &str,
        options: CallOptions,
    ) -> Result<Output> {
        self.execute(Call::get(format!("/components/registry/{key}")).with_options(options))
            .await
    }

    /// Lists the event sources of an organization.
    pub async fn orgs_sources_list(&mut self, id: &str, options: CallOptions) -> Result<Output> {
        self.execute(Call::get(format!("/orgs/{id}/sources")).with_options(options))
            .await
    }

    /// Lists the subscriptions of an organization.
    pub async fn orgs_subscriptions_list(
        &mut self,
        id: &str,
        options: CallOptions,
    ) -> Result<Output> {
        self.execute(Call::get(format!("/orgs/{id}/subscriptions")).with_options(options))
            .await
    }

    /// Deletes an event source.
    pub async fn source_delete(&mut self, id: &str, options: CallOptions) -> Result<Output> {
        self.execute(Call::delete(format!("/sources/{id}")).with_options(options))
            .await
    }

    /// Lists the events an event source emitted.
    pub async fn source_event_summaries(
        &mut self,
        id: &str,
        query: EventSummariesQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::get(format!("/sources/{id}/event_summaries"))
            .with_options(options)
            .layer("expand", query.expand)
            .layer("limit", query.limit);
        self.execute(call).await
    }

    /// Deletes the events emitted by an event source.
    pub async fn source_events_delete(&mut self, id: &str, options: CallOptions) -> Result<Output> {
        self.execute(Call::delete(format!("/sources/{id}/events")).with_options(options))
            .await
    }

    /// Updates an event source.
    pub async fn source_update(
        &mut self,
        id: &str,
        body: impl Into<Body>,
        options: CallOptions,
    ) -> Result<Output> {
        self.execute(Call::put(format!("/sources/{id}"), body).with_options(options))
            .await
    }

    /// Creates an event source.
    pub async fn sources_create(
        &mut self,
        body: impl Into<Body>,
        options: CallOptions,
    ) -> Result<Output> {
        self.execute(Call::post("/sources/", body).with_options(options))
            .await
    }

    /// Subscribes a listener to an emitter.
    pub async fn subscription_create(
        &mut self,
        body: impl Into<Body>,
        query: SubscriptionQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::post("/subscriptions", body)
            .with_options(options)
            .layer("emitter_id", query.emitter_id)
            .layer("event_name", query.event_name)
            .layer("listener_id", query.listener_id);
        self.execute(call).await
    }

    /// Removes the subscriptions matching the query.
    pub async fn subscriptions_delete(
        &mut self,
        query: SubscriptionQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::delete("/subscriptions")
            .with_options(options)
            .layer("emitter_id", query.emitter_id)
            .layer("event_name", query.event_name)
            .layer("listener_id", query.listener_id);
        self.execute(call).await
    }

    /// Fetches the authenticated user.
    pub async fn users_me(&mut self, options: CallOptions) -> Result<Output> {
        self.execute(Call::get("/users/me").with_options(options))
            .await
    }

    /// Lists the authenticated user's event sources.
    pub async fn users_me_sources(&mut self, options: CallOptions) -> Result<Output> {
        self.execute(Call::get("/users/me/sources/").with_options(options))
            .await
    }

    /// Lists the authenticated user's subscriptions.
    pub async fn users_me_subscriptions(&mut self, options: CallOptions) -> Result<Output> {
        self.execute(Call::get("/users/me/subscriptions").with_options(options))
            .await
    }

    /// Lists the authenticated user's webhooks.
    pub async fn users_me_webhooks(&mut self, options: CallOptions) -> Result<Output> {
        self.execute(Call::get("/users/me/webhooks").with_options(options))
            .await
    }

    /// Creates a webhook.
    pub async fn webhook_create(
        &mut self,
        body: impl Into<Body>,
        query: WebhookQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::post("/webhooks", body)
            .with_options(options)
            .layer("description", query.description)
            .layer("name", query.name)
            .layer("url", query.url);
        self.execute(call).await
    }

    /// Deletes a webhook.
    pub async fn webhook_delete(&mut self, id: &str, options: CallOptions) -> Result<Output> {
        self.execute(Call::delete(format!("/webhooks/{id}")).with_options(options))
            .await
    }

    /// Lists the events a workflow emitted.
    pub async fn workflow_event_summaries(
        &mut self,
        workflow_id: &str,
        query: EventSummariesQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::get(format!("/workflows/{workflow_id}/event_summaries"))
            .with_options(options)
            .layer("expand", query.expand)
            .layer("limit", query.limit);
        self.execute(call).await
    }

    /// Event summaries of a workflow's `$errors` stream.
    pub async fn workflow_errors_event_summaries(
        &mut self,
        workflow_id: &str,
        query: EventSummariesQuery,
        options: CallOptions,
    ) -> Result<Output> {
        let call = Call::get(format!("/workflows/{workflow_id}/$errors/event_summaries"))
            .with_options(options)
            .layer("expand", query.expand)
            .layer("limit", query.limit);
        self.execute(call).await
    }
}
