//! One virtual user: a sequential request loop over the variant's surface.
//!
//! Loop order: health, create, then read and update when the create
//! returned an id, list (bounded page), delete when an id exists. Every
//! request produces exactly one sample, including timeouts and connection
//! errors, which are recorded with status 0.

use super::sink::SampleSink;
use chrono::Utc;
use mrb_common::{LoadSample, Operation, RuntimeId};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Settings shared by every virtual user of one run.
#[derive(Debug, Clone)]
pub struct VuSettings {
    pub runtime_id: RuntimeId,
    pub base_url: String,
    pub think_time: Duration,
    pub list_limit: u32,
}

pub struct VirtualUser {
    id: usize,
    client: Client,
    settings: VuSettings,
    sink: SampleSink,
}

impl VirtualUser {
    pub fn new(id: usize, client: Client, settings: VuSettings, sink: SampleSink) -> Self {
        Self {
            id,
            client,
            settings,
            sink,
        }
    }

    /// Run iterations until `stop` flips to true. The request in flight when
    /// the stop arrives completes (or times out) before the loop exits.
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> u64 {
        let mut iterations = 0u64;
        debug!(vu = self.id, runtime_id = %self.settings.runtime_id, "Virtual user started");

        'outer: loop {
            let mut plan = self.iteration_plan();
            while let Some(operation) = plan.next {
                if *stop.borrow() {
                    break 'outer;
                }
                plan.run_step(operation).await;
            }
            iterations += 1;

            let sender_gone = tokio::select! {
                _ = tokio::time::sleep(self.settings.think_time) => false,
                changed = stop.changed() => changed.is_err(),
            };
            // A dropped sender also means stop.
            if sender_gone || *stop.borrow() {
                break;
            }
        }

        debug!(vu = self.id, iterations, "Virtual user stopped");
        iterations
    }

    fn iteration_plan(&self) -> IterationPlan<'_> {
        IterationPlan {
            user: self,
            next: Some(Operation::Health),
            item_id: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn create_payload(&self) -> Value {
        json!({
            "name": format!("load-item-{}-{}", self.id, fastrand::u32(..)),
            "description": format!("created by virtual user {}", self.id),
            "price": random_price(),
        })
    }

    /// Issue one request and record its sample. Returns the parsed body on success.
    async fn request(
        &self,
        operation: Operation,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Option<Value> {
        let mut builder = self.client.request(method, &url);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let result = builder.send().await;
        let (status_code, parsed) = match result {
            Ok(response) => {
                let status = response.status();
                let parsed = if status.is_success() {
                    response.json::<Value>().await.ok()
                } else {
                    None
                };
                (status.as_u16(), parsed)
            }
            Err(e) => {
                trace!(vu = self.id, %operation, url = %url, error = %e, "Request failed");
                (0, None)
            }
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let success = (200..300).contains(&status_code);

        self.sink.record(LoadSample {
            runtime_id: self.settings.runtime_id.clone(),
            operation,
            status_code,
            duration_ms,
            success,
            timestamp: Utc::now(),
        });
        parsed
    }
}

/// Price in `1.00..1000.00` with two decimals.
fn random_price() -> f64 {
    ((1.0 + fastrand::f64() * 999.0) * 100.0).round() / 100.0
}

/// Steps of one iteration, produced lazily so the create response can
/// decide whether the item-specific steps run.
struct IterationPlan<'a> {
    user: &'a VirtualUser,
    next: Option<Operation>,
    item_id: Option<String>,
}

impl IterationPlan<'_> {
    fn advance(&mut self, done: Operation) {
        self.next = match done {
            Operation::Health => Some(Operation::Create),
            Operation::Create if self.item_id.is_some() => Some(Operation::Read),
            Operation::Create => Some(Operation::List),
            Operation::Read => Some(Operation::Update),
            Operation::Update => Some(Operation::List),
            Operation::List if self.item_id.is_some() => Some(Operation::Delete),
            Operation::List | Operation::Delete => None,
        };
    }

    async fn run_step(&mut self, operation: Operation) {
        let user = self.user;
        let id = self.item_id.clone().unwrap_or_default();
        match operation {
            Operation::Health => {
                user.request(operation, Method::GET, user.url("/health"), None)
                    .await;
            }
            Operation::Create => {
                let body = user
                    .request(
                        operation,
                        Method::POST,
                        user.url("/items"),
                        Some(user.create_payload()),
                    )
                    .await;
                self.item_id = body
                    .as_ref()
                    .and_then(|b| b["data"]["id"].as_str())
                    .map(str::to_string);
            }
            Operation::Read => {
                user.request(operation, Method::GET, user.url(&format!("/items/{id}")), None)
                    .await;
            }
            Operation::Update => {
                let body = json!({"price": random_price()});
                user.request(
                    operation,
                    Method::PUT,
                    user.url(&format!("/items/{id}")),
                    Some(body),
                )
                .await;
            }
            Operation::List => {
                let path = format!("/items?limit={}", user.settings.list_limit);
                user.request(operation, Method::GET, user.url(&path), None)
                    .await;
            }
            Operation::Delete => {
                user.request(operation, Method::DELETE, user.url(&format!("/items/{id}")), None)
                    .await;
            }
        }
        self.advance(operation);
    }
}
