//! Tool dispatch: fan-out across source adapters behind circuit breakers.

use crate::tools::ToolName;
use crate::transform::TransformedRequest;
use crate::validation::severity_from;
use futures::future::join_all;
use pagepilot_adapters::{AdapterContent, AdapterRegistry, RunbookMatch, SearchResult};
use pagepilot_breaker::{BreakerError, BreakerRegistry};
use pagepilot_core::{PipelineError, Severity};
use pagepilot_perf::PerformanceMonitor;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

const FEEDBACK_RING_CAP: usize = 1000;

/// Result of one dispatched tool call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub data: Value,
    /// Per-adapter failures that did not fail the overall call.
    pub partial_failures: Vec<Value>,
}

impl DispatchOutcome {
    fn clean(data: Value) -> Self {
        DispatchOutcome {
            data,
            partial_failures: Vec::new(),
        }
    }
}

/// Maps tool names to adapter fan-out operations.
///
/// Every adapter call runs under that adapter's external-service breaker, so
/// one misbehaving source cannot stall or poison a dispatch. Partial
/// failures are reported in metadata; the call only fails outright when no
/// adapter produced a result.
pub struct ToolDispatcher {
    adapters: Arc<AdapterRegistry>,
    breakers: Arc<BreakerRegistry>,
    perf: Arc<PerformanceMonitor>,
    feedback: Mutex<VecDeque<Value>>,
}

impl ToolDispatcher {
    /// Creates a dispatcher over the given registries.
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        breakers: Arc<BreakerRegistry>,
        perf: Arc<PerformanceMonitor>,
    ) -> Self {
        ToolDispatcher {
            adapters,
            breakers,
            perf,
            feedback: Mutex::new(VecDeque::new()),
        }
    }

    /// Dispatches one transformed request and records its performance sample.
    pub async fn dispatch(
        &self,
        tool: ToolName,
        request: &TransformedRequest,
    ) -> Result<DispatchOutcome, PipelineError> {
        let started = Instant::now();
        let result = self.dispatch_inner(tool, request).await;
        self.perf.record(
            tool.as_str(),
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_err(),
        );
        result
    }

    async fn dispatch_inner(
        &self,
        tool: ToolName,
        request: &TransformedRequest,
    ) -> Result<DispatchOutcome, PipelineError> {
        let args = &request.args;
        match tool {
            ToolName::SearchRunbooks => self.search_runbooks(args).await,
            ToolName::SearchKnowledgeBase => self.search_knowledge_base(args).await,
            ToolName::GetProcedure => self.get_procedure(args).await,
            ToolName::GetDecisionTree => self.get_decision_tree(args).await,
            ToolName::GetEscalationPath => self.get_escalation_path(args),
            ToolName::ListSources => self.list_sources(args).await,
            ToolName::RecordResolutionFeedback => self.record_feedback(args),
        }
    }

    async fn search_runbooks(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let alert_type = args
            .get("alert_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let severity = severity_from(args, "severity").unwrap_or(Severity::Medium);
        let systems: Vec<String> = args
            .get("affected_systems")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let max_results = args
            .get("max_results")
            .and_then(Value::as_i64)
            .unwrap_or(10)
            .clamp(1, 100) as usize;

        let adapters = self.adapters.all();
        let queried = adapters.len();

        // One breaker-guarded probe per adapter, all in flight at once.
        let probes = adapters.iter().map(|adapter| {
            let breaker = self.breakers.external_service(adapter.name());
            let alert_type = alert_type.clone();
            let systems = systems.clone();
            async move {
                let outcome = breaker
                    .execute(|| async {
                        adapter
                            .search_runbooks(&alert_type, severity, &systems)
                            .await
                    })
                    .await;
                (adapter.name().to_string(), outcome)
            }
        });

        let mut matches: Vec<RunbookMatch> = Vec::new();
        let mut failures = Vec::new();
        for (name, outcome) in join_all(probes).await {
            match outcome {
                Ok(found) => matches.extend(found),
                Err(error) => failures.push(partial_failure(&name, &error)),
            }
        }

        if matches.is_empty() && !failures.is_empty() && failures.len() == queried {
            return Err(PipelineError::Source {
                adapter: "all".to_string(),
                message: "every source failed during runbook search".to_string(),
            });
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(max_results);
        let total = matches.len();

        Ok(DispatchOutcome {
            data: json!({
                "runbooks": matches,
                "total": total,
                "sources_queried": queried,
            }),
            partial_failures: failures,
        })
    }

    async fn search_knowledge_base(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let max_results = args
            .get("max_results")
            .and_then(Value::as_i64)
            .unwrap_or(20)
            .clamp(1, 100) as usize;
        let filters = args.get("categories").cloned();

        let adapters = self.adapters.all();
        let queried = adapters.len();

        let probes = adapters.iter().map(|adapter| {
            let breaker = self.breakers.external_service(adapter.name());
            let query = query.clone();
            let filters = filters.clone();
            async move {
                let outcome = breaker
                    .execute(|| async { adapter.search(&query, filters.as_ref()).await })
                    .await;
                (adapter.name().to_string(), outcome)
            }
        });

        let mut results: Vec<SearchResult> = Vec::new();
        let mut failures = Vec::new();
        for (name, outcome) in join_all(probes).await {
            match outcome {
                Ok(found) => results.extend(found),
                Err(error) => failures.push(partial_failure(&name, &error)),
            }
        }

        if results.is_empty() && !failures.is_empty() && failures.len() == queried {
            return Err(PipelineError::Source {
                adapter: "all".to_string(),
                message: "every source failed during knowledge-base search".to_string(),
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(max_results);
        let total = results.len();

        Ok(DispatchOutcome {
            data: json!({
                "results": results,
                "total": total,
                "sources_queried": queried,
            }),
            partial_failures: failures,
        })
    }

    async fn get_procedure(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let id = args
            .get("procedure_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut failures = Vec::new();
        for adapter in self.adapters.all() {
            let breaker = self.breakers.external_service(adapter.name());
            let id = id.clone();
            let outcome = breaker
                .execute(|| async { adapter.get_document(&id).await })
                .await;
            match outcome {
                Ok(Some(content)) => {
                    return Ok(DispatchOutcome {
                        data: json!({
                            "procedure": shape_content(content),
                            "source": adapter.name(),
                        }),
                        partial_failures: failures,
                    });
                }
                Ok(None) => {}
                Err(error) => failures.push(partial_failure(adapter.name(), &error)),
            }
        }

        Err(PipelineError::NotFound {
            what: format!("procedure '{id}'"),
        })
    }

    async fn get_decision_tree(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let alert_type = args
            .get("alert_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let severity = severity_from(args, "severity").unwrap_or(Severity::Medium);

        let mut failures = Vec::new();
        for adapter in self.adapters.all() {
            let breaker = self.breakers.external_service(adapter.name());
            let alert_type = alert_type.clone();
            let outcome = breaker
                .execute(|| async {
                    adapter.search_runbooks(&alert_type, severity, &[]).await
                })
                .await;
            match outcome {
                Ok(matches) => {
                    if let Some(found) = matches
                        .into_iter()
                        .find(|m| m.runbook.decision_tree.is_some())
                    {
                        let runbook_id = found.runbook.id.clone();
                        return Ok(DispatchOutcome {
                            data: json!({
                                "decision_tree": found.runbook.decision_tree,
                                "runbook_id": runbook_id,
                                "source": adapter.name(),
                            }),
                            partial_failures: failures,
                        });
                    }
                }
                Err(error) => failures.push(partial_failure(adapter.name(), &error)),
            }
        }

        Err(PipelineError::NotFound {
            what: format!("decision tree for alert type '{alert_type}'"),
        })
    }

    fn get_escalation_path(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let severity = severity_from(args, "severity").ok_or_else(|| {
            PipelineError::validation("severity must be one of critical, high, medium, low, info")
        })?;
        let business_hours = args
            .get("business_hours")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let failed_attempts = args
            .get("failed_attempts")
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .max(0) as usize;

        Ok(DispatchOutcome::clean(escalation_path(
            severity,
            business_hours,
            failed_attempts,
        )))
    }

    async fn list_sources(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let include_health = args
            .get("include_health")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let metadata = self.adapters.metadata_all().await;
        let health = if include_health {
            Some(self.adapters.health_check_all().await)
        } else {
            None
        };

        let sources: Vec<Value> = metadata
            .into_iter()
            .map(|meta| {
                let health_entry = health
                    .as_ref()
                    .and_then(|reports| reports.iter().find(|h| h.name == meta.name));
                json!({
                    "name": meta.name,
                    "type": meta.adapter_type,
                    "document_count": meta.document_count,
                    "ready": meta.ready,
                    "last_indexed": meta.last_indexed,
                    "health": health_entry,
                })
            })
            .collect();
        let total = sources.len();

        Ok(DispatchOutcome::clean(json!({
            "sources": sources,
            "total": total,
        })))
    }

    fn record_feedback(&self, args: &Value) -> Result<DispatchOutcome, PipelineError> {
        let feedback_id = Uuid::new_v4().to_string();
        let record = json!({
            "feedback_id": feedback_id,
            "runbook_id": args.get("runbook_id"),
            "outcome": args.get("outcome"),
            "resolution_time_minutes": args.get("resolution_time_minutes"),
            "notes": args.get("notes"),
            "recorded_at": chrono::Utc::now(),
        });

        {
            let mut ring = self.feedback.lock().expect("feedback ring poisoned");
            ring.push_back(record.clone());
            while ring.len() > FEEDBACK_RING_CAP {
                ring.pop_front();
            }
        }

        tracing::info!(
            runbook_id = args.get("runbook_id").and_then(serde_json::Value::as_str).unwrap_or("?"),
            outcome = args.get("outcome").and_then(serde_json::Value::as_str).unwrap_or("?"),
            "resolution feedback recorded"
        );

        Ok(DispatchOutcome::clean(json!({
            "recorded": true,
            "feedback_id": feedback_id,
        })))
    }

    /// Recorded feedback entries, oldest first.
    pub fn feedback_log(&self) -> Vec<Value> {
        self.feedback
            .lock()
            .expect("feedback ring poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

fn partial_failure<E: std::fmt::Display>(adapter: &str, error: &BreakerError<E>) -> Value {
    json!({
        "source": adapter,
        "error": error.to_string(),
        "circuit_open": error.is_circuit_open(),
    })
}

/// Deserializes text content opportunistically; falls back to a raw wrapper.
fn shape_content(content: AdapterContent) -> Value {
    match content {
        AdapterContent::Structured(value) => value,
        AdapterContent::Text(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) => parsed,
            Err(_) => json!({"kind": "text", "raw": raw}),
        },
    }
}

/// Static severity × business-hours escalation matrix.
///
/// Repeated failed attempts skip the first level so the call lands one step
/// higher.
pub fn escalation_path(severity: Severity, business_hours: bool, failed_attempts: usize) -> Value {
    let mut levels: Vec<Value> = match (severity, business_hours) {
        (Severity::Critical, _) => vec![
            level(1, "primary on-call", "page", 0),
            level(2, "secondary on-call", "page", 15),
            level(3, "engineering manager", "phone", 30),
            level(4, "incident commander", "page", 45),
        ],
        (Severity::High, _) => vec![
            level(1, "primary on-call", "page", 0),
            level(2, "team lead", "phone", 30),
            level(3, "engineering manager", "phone", 60),
        ],
        (Severity::Medium, true) => vec![
            level(1, "team channel", "chat", 0),
            level(2, "team lead", "chat", 120),
        ],
        (Severity::Medium, false) => vec![
            level(1, "ticket queue", "ticket", 0),
            level(2, "primary on-call", "page", 240),
        ],
        (_, true) => vec![level(1, "team channel", "chat", 0)],
        (_, false) => vec![level(1, "ticket queue", "ticket", 0)],
    };

    let skipped = if failed_attempts >= 2 && levels.len() > 1 {
        levels.remove(0);
        true
    } else {
        false
    };

    json!({
        "severity": severity,
        "business_hours": business_hours,
        "failed_attempts": failed_attempts,
        "levels": levels,
        "skipped_first_level": skipped,
    })
}

fn level(order: u32, role: &str, via: &str, wait_minutes: u32) -> Value {
    json!({
        "order": order,
        "role": role,
        "contact_via": via,
        "wait_minutes": wait_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_path_pages_immediately() {
        let path = escalation_path(Severity::Critical, false, 0);
        assert_eq!(path["levels"][0]["role"], "primary on-call");
        assert_eq!(path["levels"][0]["wait_minutes"], 0);
        assert_eq!(path["levels"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn low_severity_off_hours_goes_to_ticket_queue() {
        let path = escalation_path(Severity::Low, false, 0);
        assert_eq!(path["levels"][0]["role"], "ticket queue");
        assert_eq!(path["levels"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn repeated_failures_skip_first_level() {
        let path = escalation_path(Severity::High, true, 2);
        assert_eq!(path["skipped_first_level"], true);
        assert_eq!(path["levels"][0]["role"], "team lead");
    }

    #[test]
    fn text_content_parses_opportunistically() {
        let parsed = shape_content(AdapterContent::Text("{\"steps\": 3}".into()));
        assert_eq!(parsed["steps"], 3);

        let raw = shape_content(AdapterContent::Text("plain prose".into()));
        assert_eq!(raw["kind"], "text");
        assert_eq!(raw["raw"], "plain prose");
    }
}
