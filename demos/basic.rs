use pipedreamer::{batch, CallOptions, EventSummariesQuery, PipedreamClient, RetryCondition, Select};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut client = PipedreamClient::from_env()?;
    client.set_retry_on([RetryCondition::Transport, RetryCondition::RateLimit])?;
    client.set_max_retries(3)?;

    let me = client.users_me(CallOptions::new()).await?;
    println!("{:?}", me.json());

    let sources = client
        .users_me_sources(CallOptions::new().all_pages())
        .await?
        .into_json()
        .unwrap_or_default();
    let ids: Vec<String> = sources["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    for chunk in batch(&ids, 10, <[String]>::to_vec)? {
        for id in chunk {
            let summaries = client
                .source_event_summaries(
                    &id,
                    EventSummariesQuery {
                        limit: Some(5),
                        ..EventSummariesQuery::default()
                    },
                    CallOptions::new().retry([RetryCondition::Status(503)], 2),
                )
                .await?;
            println!("{id}: {:?}", summaries.json());
        }
    }

    let status = client
        .users_me_webhooks(CallOptions::new().select(Select::Code))
        .await?;
    println!("webhooks status: {:?}", status.status());

    Ok(())
}
