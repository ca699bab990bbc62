//! End-to-end lifecycle tests.
//!
//! These tests drive complete pipelines and check:
//!
//! 1. Ordering - `before` forward, `after` and `on_error` reversed
//! 2. Short-circuit - nothing runs once the response is sent
//! 3. Identity - hooks merge into the containers the handler captured
//! 4. Recovery - normalization, `ctx.error`, fallback bodies
//! 5. Scratch pad - state shared across stages

use kairos_core::{
    BufferedSink, Container, ErrorEnvelope, Hook, Outcome, Phase, Pipeline, PipelineOptions,
    RequestContext, ResponseContext, TransportRequest,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn contexts(transport: TransportRequest) -> (RequestContext, ResponseContext, BufferedSink) {
    let sink = BufferedSink::new();
    let req = RequestContext::new(transport);
    let res = ResponseContext::new(sink.clone());
    (req, res, sink)
}

fn post() -> TransportRequest {
    TransportRequest::new("POST", "/api/test")
}

/// A hook that records every stage it runs under its name.
fn recording(name: &str, log: &Log) -> Hook {
    let (b, a, e) = (log.clone(), log.clone(), log.clone());
    let (nb, na, ne) = (name.to_string(), name.to_string(), name.to_string());
    Hook::named(name)
        .before(move |_req, _res| {
            let (log, name) = (b.clone(), nb.clone());
            async move {
                log.lock().push(format!("before:{name}"));
                Ok(())
            }
        })
        .after(move |_req, _res, _output| {
            let (log, name) = (a.clone(), na.clone());
            async move {
                log.lock().push(format!("after:{name}"));
                Ok(())
            }
        })
        .on_error(move |_err, _req, _res| {
            let (log, name) = (e.clone(), ne.clone());
            async move {
                log.lock().push(format!("on_error:{name}"));
                Ok(())
            }
        })
}

fn ok_handler(log: &Log) -> Pipeline {
    let log = log.clone();
    Pipeline::new(move |_req: RequestContext, _res: ResponseContext| {
        let log = log.clone();
        async move {
            log.lock().push("handler".to_string());
            Ok(Some(json!({"message": "ok"})))
        }
    })
}

fn failing_handler(log: &Log) -> Pipeline {
    let log = log.clone();
    Pipeline::new(move |_req: RequestContext, _res: ResponseContext| {
        let log = log.clone();
        async move {
            log.lock().push("handler".to_string());
            Err(anyhow::anyhow!("x"))
        }
    })
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_stage_ordering_on_success() {
    let log = new_log();
    let pipeline = ok_handler(&log)
        .register(recording("A", &log))
        .register(recording("B", &log));

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        *log.lock(),
        vec!["before:A", "before:B", "handler", "after:B", "after:A"]
    );
    assert_eq!(sink.status(), Some(200));
    assert_eq!(sink.body(), Some(json!({"message": "ok"})));
}

#[tokio::test]
async fn test_on_error_runs_in_reverse() {
    let log = new_log();
    let pipeline = failing_handler(&log)
        .register(recording("A", &log))
        .register(recording("B", &log))
        .register(recording("C", &log));

    let (req, res, _sink) = contexts(post());
    pipeline.execute(req, res).await;

    assert_eq!(
        *log.lock(),
        vec![
            "before:A",
            "before:B",
            "before:C",
            "handler",
            "on_error:C",
            "on_error:B",
            "on_error:A"
        ]
    );
}

#[tokio::test]
async fn test_after_reverse_order_composes() {
    let add_five = Hook::named("addFive").after(|_req, res: ResponseContext, output: Value| async move {
        let value = output["value"].as_i64().unwrap_or(0);
        res.output().set_field("value", json!(value + 5));
        Ok(())
    });
    let double = Hook::named("double").after(|_req, res: ResponseContext, output: Value| async move {
        let value = output["value"].as_i64().unwrap_or(0);
        res.output().set_field("value", json!(value * 2));
        Ok(())
    });

    // Registered as addFive, double: double runs first, (10 * 2) + 5.
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Ok(Some(json!({"value": 10})))
    })
    .register(add_five)
    .register(double);

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res).await;

    assert_eq!(sink.body(), Some(json!({"value": 25})));
}

#[tokio::test]
async fn test_before_failure_stops_remaining_before_hooks() {
    let log = new_log();
    let boom = Hook::named("boom").before(|_req, _res| async { Err(anyhow::anyhow!("nope")) });
    let pipeline = ok_handler(&log)
        .register(recording("A", &log))
        .register(boom)
        .register(recording("C", &log));

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert!(matches!(
        outcome,
        Outcome::Recovered {
            failed_in: Phase::Before,
            handled_by_hook: false,
            ..
        }
    ));
    assert_eq!(*log.lock(), vec!["before:A", "on_error:C", "on_error:A"]);
    assert_eq!(sink.status(), Some(500));
}

#[tokio::test]
async fn test_after_failure_enters_error_path() {
    let log = new_log();
    let broken = Hook::named("broken").after(|_req, _res, _output| async {
        Err(anyhow::Error::from(ErrorEnvelope::new(502, "UpstreamError", "bad gateway")))
    });
    let pipeline = ok_handler(&log)
        .register(recording("A", &log))
        .register(broken);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res).await;

    assert_eq!(outcome.error().map(|e| e.code.as_str()), Some("UpstreamError"));
    assert!(!log.lock().contains(&"after:A".to_string()));
    assert_eq!(sink.status(), Some(502));
    assert_eq!(req.error().map(|e| e.status), Some(502));
}

// ============================================================================
// Short-circuit
// ============================================================================

#[tokio::test]
async fn test_before_short_circuit_skips_handler() {
    let log = new_log();
    let gate = Hook::named("gate").before(|_req, res: ResponseContext| async move {
        res.status(204).json(json!({"cached": true}));
        Ok(())
    });

    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::anyhow!("handler must not run"))
    })
    .register(gate)
    .register(recording("late", &log));

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res.clone()).await;

    assert_eq!(
        outcome,
        Outcome::ShortCircuited {
            phase: Phase::Before,
            hook: Some("gate".to_string())
        }
    );
    assert!(res.response_sent());
    assert!(req.error().is_none());
    assert!(log.lock().is_empty());
    assert_eq!(sink.send_count(), 1);
    assert_eq!(sink.status(), Some(204));
}

#[tokio::test]
async fn test_transport_headers_sent_short_circuits() {
    let flushed = Hook::named("stream").before(|_req, res: ResponseContext| async move {
        res.mark_sent();
        Ok(())
    });
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::anyhow!("unreachable"))
    })
    .register(flushed);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert!(outcome.is_short_circuited());
    assert_eq!(sink.send_count(), 0);
}

#[tokio::test]
async fn test_handler_sending_skips_after() {
    let log = new_log();
    let pipeline = Pipeline::new(|_req: RequestContext, res: ResponseContext| async move {
        res.status(201).json(json!({"id": 1}));
        Ok(Some(json!({"ignored": true})))
    })
    .register(recording("A", &log));

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res.clone()).await;

    assert_eq!(
        outcome,
        Outcome::ShortCircuited {
            phase: Phase::Handling,
            hook: None
        }
    );
    assert_eq!(*log.lock(), vec!["before:A"]);
    assert_eq!(sink.body(), Some(json!({"id": 1})));
    assert_eq!(res.output().get(), Some(json!({"ignored": true})));
}

#[tokio::test]
async fn test_after_short_circuit_stops_remaining_after_hooks() {
    let log = new_log();
    let responder = Hook::named("responder").after(|_req, res: ResponseContext, output: Value| async move {
        res.json(json!({"wrapped": output}));
        Ok(())
    });
    // Reverse order: responder runs first, A never does.
    let pipeline = ok_handler(&log)
        .register(recording("A", &log))
        .register(responder);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert!(outcome.is_short_circuited());
    assert_eq!(*log.lock(), vec!["before:A", "handler"]);
    assert_eq!(sink.body(), Some(json!({"wrapped": {"message": "ok"}})));
    assert_eq!(sink.send_count(), 1);
}

// ============================================================================
// Identity and merge semantics
// ============================================================================

#[tokio::test]
async fn test_input_merges_and_keeps_identity() {
    let captured: Arc<Mutex<Option<Container>>> = Arc::new(Mutex::new(None));
    let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

    let capture = captured.clone();
    let first = Hook::named("first").before(move |req: RequestContext, _res| {
        let capture = capture.clone();
        async move {
            *capture.lock() = Some(req.input().clone());
            req.input().merge(json!({"first": "one"}));
            Ok(())
        }
    });
    let second = Hook::named("second").before(|req: RequestContext, _res| async move {
        req.input().merge(json!({"second": "two"}));
        Ok(())
    });

    let observed = seen.clone();
    let pipeline = Pipeline::new(move |req: RequestContext, _res: ResponseContext| {
        let observed = observed.clone();
        async move {
            *observed.lock() = req.input().get();
            Ok(None)
        }
    })
    .register(first)
    .register(second);

    let (req, res, _sink) = contexts(post());
    let req = req.with_input(json!({"initial": "seed"}));
    let before_any_hook = req.input().clone();

    pipeline.execute(req.clone(), res).await;

    assert_eq!(
        *seen.lock(),
        Some(json!({"initial": "seed", "first": "one", "second": "two"}))
    );
    assert!(before_any_hook.ptr_eq(req.input()));
    let captured = captured.lock().clone().unwrap();
    assert!(captured.ptr_eq(&before_any_hook));
}

#[tokio::test]
async fn test_input_counter_mutations_accumulate() {
    let bump = |name: &str| {
        Hook::named(name).before(|req: RequestContext, _res| async move {
            let next = req.input().field("counter").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            req.input().set_field("counter", json!(next));
            Ok(())
        })
    };

    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        Ok(Some(json!({"counter": req.input().field("counter")})))
    })
    .register(bump("one"))
    .register(bump("two"))
    .register(bump("three"));

    let (req, res, sink) = contexts(post());
    let req = req.with_input(json!({"counter": 1}));
    pipeline.execute(req, res).await;

    assert_eq!(sink.body(), Some(json!({"counter": 4})));
}

#[tokio::test]
async fn test_noop_after_leaves_output_unchanged() {
    let returned = json!({"user": {"id": 7, "tags": ["a", "b"]}, "total": 1.5});
    let expected = returned.clone();

    let pipeline = Pipeline::new(move |_req: RequestContext, _res: ResponseContext| {
        let returned = returned.clone();
        async move { Ok(Some(returned)) }
    })
    .register(Hook::named("observer").after(|_req, _res, _output| async { Ok(()) }));

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res.clone()).await;

    assert_eq!(res.output().get(), Some(expected.clone()));
    assert_eq!(
        serde_json::to_string(&sink.body().unwrap()).unwrap(),
        serde_json::to_string(&expected).unwrap()
    );
}

#[tokio::test]
async fn test_after_skipped_when_output_undefined() {
    let log = new_log();
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async { Ok(None) })
        .register(recording("A", &log));

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert!(outcome.is_completed());
    assert_eq!(*log.lock(), vec!["before:A"]);
    assert_eq!(sink.body(), Some(json!({})));
    assert_eq!(sink.status(), Some(200));
}

#[tokio::test]
async fn test_output_replaced_wholesale_by_after() {
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Ok(Some(json!("plain")))
    })
    .register(Hook::named("wrap").after(|_req, res: ResponseContext, output: Value| async move {
        res.output().merge(json!({"data": output}));
        Ok(())
    }));

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res).await;

    assert_eq!(sink.body(), Some(json!({"data": "plain"})));
}

// ============================================================================
// Input population
// ============================================================================

#[tokio::test]
async fn test_input_derived_from_transport() {
    let transport = TransportRequest::new("POST", "/api/test?_rsc=1&page=2")
        .with_query("_rsc", json!("1"))
        .with_query("page", json!("2"))
        .with_query("name", json!("query"))
        .with_body(json!({"name": "body"}));

    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        Ok(req.input().get())
    });

    let (req, res, sink) = contexts(transport);
    pipeline.execute(req, res).await;

    assert_eq!(sink.body(), Some(json!({"page": "2", "name": "body"})));
}

#[tokio::test]
async fn test_seeded_input_is_not_overwritten() {
    let transport = post().with_body(json!({"from": "transport"}));
    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        Ok(req.input().get())
    });

    let (req, res, sink) = contexts(transport);
    pipeline
        .execute(req.with_input(json!({"from": "seed"})), res)
        .await;

    assert_eq!(sink.body(), Some(json!({"from": "seed"})));
}

#[tokio::test]
async fn test_custom_reserved_prefix() {
    let transport = TransportRequest::new("GET", "/")
        .with_query("_keep", json!("yes"))
        .with_query("$drop", json!("no"));
    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        Ok(req.input().get())
    })
    .with_options(PipelineOptions::default().reserved_query_prefix("$"));

    let (req, res, sink) = contexts(transport);
    pipeline.execute(req, res).await;

    assert_eq!(sink.body(), Some(json!({"_keep": "yes"})));
}

// ============================================================================
// Error path
// ============================================================================

#[tokio::test]
async fn test_handler_error_without_hooks_yields_500() {
    let log = new_log();
    let pipeline = failing_handler(&log);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res.clone()).await;

    assert!(matches!(
        outcome,
        Outcome::Recovered {
            failed_in: Phase::Handling,
            handled_by_hook: false,
            ..
        }
    ));
    assert_eq!(res.emissions(), 1);
    assert_eq!(sink.send_count(), 1);
    assert_eq!(sink.status(), Some(500));
    assert_eq!(
        sink.body(),
        Some(json!({"code": "InternalError", "message": "An internal error occurred"}))
    );

    let error = req.error().unwrap();
    assert_eq!(error.code, "InternalError");
    assert_eq!(error.status, 500);
    assert_eq!(error.message, "x");
}

#[tokio::test]
async fn test_validation_error_from_before() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();

    let validator = Hook::named("validator").before(|_req, _res| async {
        Err(anyhow::Error::from(ErrorEnvelope::validation(
            "Input validation failed",
            json!([{"path": ["name"], "code": "required", "message": "Required"}]),
        )))
    });

    let pipeline = Pipeline::new(move |_req: RequestContext, _res: ResponseContext| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    })
    .register(validator);

    let (req, res, sink) = contexts(post());
    pipeline.execute(req.clone(), res).await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(req.error().map(|e| e.code.as_str()), Some("ValidationError"));
    assert_eq!(sink.status(), Some(400));
    assert_eq!(
        sink.body(),
        Some(json!({"code": "ValidationError", "message": "Input validation failed"}))
    );
}

#[tokio::test]
async fn test_on_error_failure_does_not_escape() {
    let log = new_log();
    let faulty = Hook::named("faulty").on_error(|_err, _req, _res| async {
        Err(anyhow::anyhow!("secondary failure"))
    });
    let pipeline = failing_handler(&log)
        .register(recording("A", &log))
        .register(faulty);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res).await;

    // A still runs after faulty failed.
    assert!(log.lock().contains(&"on_error:A".to_string()));
    assert_eq!(outcome.error().map(|e| e.message.as_str()), Some("x"));
    assert_eq!(req.error().map(|e| e.message.as_str()), Some("x"));
    assert_eq!(sink.status(), Some(500));
    assert_eq!(sink.send_count(), 1);
}

#[tokio::test]
async fn test_on_error_hook_can_respond() {
    let responder = Hook::named("responder").on_error(
        |err: ErrorEnvelope, _req, res: ResponseContext| async move {
            if !res.response_sent() {
                res.status(err.status).json(json!({"handled": err.code}));
            }
            Ok(())
        },
    );
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::Error::from(ErrorEnvelope::new(409, "Conflict", "already exists")))
    })
    .register(responder);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert!(matches!(
        outcome,
        Outcome::Recovered {
            handled_by_hook: true,
            ..
        }
    ));
    assert_eq!(sink.status(), Some(409));
    assert_eq!(sink.body(), Some(json!({"handled": "Conflict"})));
    assert_eq!(sink.send_count(), 1);
}

#[tokio::test]
async fn test_on_error_sees_normalized_envelope() {
    let seen: Arc<Mutex<Option<ErrorEnvelope>>> = Arc::new(Mutex::new(None));
    let store = seen.clone();
    let observer = Hook::named("observer").on_error(move |err: ErrorEnvelope, req: RequestContext, _res| {
        let store = store.clone();
        async move {
            assert_eq!(req.error(), Some(&err));
            *store.lock() = Some(err);
            Ok(())
        }
    });

    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::Error::from(
            ErrorEnvelope::new(400, "PrecheckFail", "missing header").with_details(json!({"header": "x-id"})),
        ))
    })
    .register(observer);

    let (req, res, _sink) = contexts(post());
    pipeline.execute(req.clone(), res).await;

    let seen = seen.lock().clone().unwrap();
    assert_eq!(seen.code, "PrecheckFail");
    assert_eq!(seen.status, 400);
    assert_eq!(seen.details, Some(json!({"header": "x-id"})));
    assert_eq!(req.scratchpad().get("error").unwrap()["code"], json!("PrecheckFail"));
}

#[tokio::test]
async fn test_verbose_fallback_body() {
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::anyhow!("database unreachable"))
    })
    .with_options(PipelineOptions::development());

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res).await;

    let body = sink.body().unwrap();
    assert_eq!(body["code"], json!("InternalError"));
    assert_eq!(body["message"], json!("database unreachable"));
    assert_eq!(body["status"], json!(500));
    assert_eq!(body["name"], json!("MiddlewareError"));
}

#[tokio::test]
async fn test_terse_fallback_keeps_client_error_message() {
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Err(anyhow::Error::from(ErrorEnvelope::new(404, "NotFound", "no such user")))
    })
    .with_options(PipelineOptions::default().internal_error_message("Something broke"));

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res).await;

    assert_eq!(sink.status(), Some(404));
    assert_eq!(
        sink.body(),
        Some(json!({"code": "NotFound", "message": "no such user"}))
    );
}

#[tokio::test]
async fn test_panics_are_recovered() {
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        if true {
            panic!("handler exploded");
        }
        Ok(None)
    });

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res).await;

    assert!(outcome.is_recovered());
    assert_eq!(sink.status(), Some(500));
    assert!(req.error().unwrap().message.contains("handler exploded"));
}

#[tokio::test]
async fn test_panicking_on_error_is_swallowed() {
    let log = new_log();
    let pipeline = failing_handler(&log)
        .register(recording("A", &log))
        .register(Hook::named("panicky").on_error(|_err, _req, _res| async {
            if true {
                panic!("on_error exploded");
            }
            Ok(())
        }));

    let (req, res, sink) = contexts(post());
    pipeline.execute(req, res).await;

    assert!(log.lock().contains(&"on_error:A".to_string()));
    assert_eq!(sink.status(), Some(500));
}

// ============================================================================
// Scratch pad
// ============================================================================

#[tokio::test]
async fn test_scratchpad_timing_across_stages() {
    let timer = Hook::named("timer")
        .before(|req: RequestContext, _res| async move {
            req.scratchpad().insert("startTime", json!(100));
            Ok(())
        })
        .after(|req: RequestContext, _res, _output| async move {
            req.scratchpad().insert("endTime", json!(175));
            let start = req.scratchpad().get_as::<i64>("startTime").unwrap_or(0);
            let end = req.scratchpad().get_as::<i64>("endTime").unwrap_or(0);
            req.scratchpad().insert("duration", json!(end - start));
            Ok(())
        });

    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        Ok(Some(json!({"started": req.scratchpad().get("startTime")})))
    })
    .register(timer);

    let (req, res, sink) = contexts(post());
    pipeline.execute(req.clone(), res).await;

    assert_eq!(sink.body(), Some(json!({"started": 100})));
    assert_eq!(req.scratchpad().get("duration"), Some(json!(75)));
}

#[tokio::test]
async fn test_scratchpad_shared_between_hooks() {
    let producer = Hook::named("producer").before(|req: RequestContext, _res| async move {
        req.scratchpad().insert("task", json!("Run diagnostics"));
        Ok(())
    });
    let consumer = Hook::named("consumer").before(|req: RequestContext, _res| async move {
        let task = req.scratchpad().get("task").unwrap_or(Value::Null);
        req.scratchpad().insert("seen", task);
        Ok(())
    });

    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async { Ok(None) })
        .register(producer)
        .register(consumer);

    let (req, res, _sink) = contexts(post());
    pipeline.execute(req.clone(), res).await;

    assert_eq!(req.scratchpad().get("seen"), Some(json!("Run diagnostics")));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_isolated() {
    let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
        tokio::task::yield_now().await;
        Ok(Some(json!({"id": req.input().field("id")})))
    })
    .register(Hook::named("tag").before(|req: RequestContext, _res| async move {
        let id = req.input().field("id").unwrap_or(Value::Null);
        req.scratchpad().insert("id", id);
        Ok(())
    }));

    let mut handles = Vec::new();
    for id in 0..32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let (req, res, sink) = contexts(post().with_body(json!({"id": id})));
            pipeline.execute(req.clone(), res).await;
            (id, sink.body(), req.scratchpad().get("id"))
        }));
    }

    for handle in handles {
        let (id, body, tagged) = handle.await.unwrap();
        assert_eq!(body, Some(json!({"id": id})));
        assert_eq!(tagged, Some(json!(id)));
    }
}

#[tokio::test]
async fn test_null_output_sends_empty_object() {
    let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
        Ok(Some(Value::Null))
    });

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req, res).await;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(sink.status(), Some(200));
    assert_eq!(sink.body(), Some(json!({})));
}

#[tokio::test]
async fn test_send_then_throw_is_not_handled_by_hook() {
    let log = new_log();
    let guard = Hook::named("guard").before(|_req, res: ResponseContext| async move {
        res.status(403).json(json!({"error": "Forbidden"}));
        Err(anyhow::anyhow!("denied after responding"))
    });
    let pipeline = ok_handler(&log)
        .register(recording("A", &log))
        .register(guard);

    let (req, res, sink) = contexts(post());
    let outcome = pipeline.execute(req.clone(), res).await;

    assert!(matches!(
        outcome,
        Outcome::Recovered {
            failed_in: Phase::Before,
            handled_by_hook: false,
            ..
        }
    ));
    assert_eq!(*log.lock(), vec!["before:A", "on_error:A"]);
    assert_eq!(req.error().map(|e| e.message.as_str()), Some("denied after responding"));
    assert_eq!(sink.status(), Some(403));
    assert_eq!(sink.body(), Some(json!({"error": "Forbidden"})));
    assert_eq!(sink.send_count(), 1);
}
