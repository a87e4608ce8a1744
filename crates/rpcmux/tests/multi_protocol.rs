//! End-to-end calls through the client invoker and an in-process dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rpcmux::handler::Structured;
use rpcmux::{
    Audit, AuditContext, ContentKind, Dispatcher, Fault, FaultKind, HandlerRegistry, Invoker,
    Loopback, MethodTable, Service, Value,
};
use rstest::{fixture, rstest};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
struct Point {
    x: i64,
    y: i64,
}

struct Bench;

fn bench_table() -> MethodTable<Bench> {
    MethodTable::new()
        .method("hello", |_: &Bench, name: String| {
            Ok::<_, anyhow::Error>(format!("Hello {name}!"))
        })
        .method("describe", |_: &Bench, value: i64| {
            Ok::<_, anyhow::Error>(format!("integer {value}"))
        })
        .method("describe", |_: &Bench, value: String| {
            Ok::<_, anyhow::Error>(format!("text {value}"))
        })
        .method("add", |_: &Bench, left: i64, right: i64| {
            Ok::<_, anyhow::Error>(left + right)
        })
        .method("sum", |_: &Bench, values: Vec<i64>| {
            Ok::<_, anyhow::Error>(values.iter().sum::<i64>())
        })
        .method("mirror", |_: &Bench, point: Structured<Point>| {
            let Structured(Point { x, y }) = point;
            Ok::<_, anyhow::Error>(Point { x: y, y: x })
        })
        .method("nothing", |_: &Bench| Ok::<_, anyhow::Error>(Value::Null))
        .method("refuse", |_: &Bench, reason: String| {
            Err::<String, _>(Fault::remote(4001, reason, None))
        })
}

#[fixture]
fn registry() -> Arc<HandlerRegistry> {
    let registry = HandlerRegistry::new();
    registry
        .add_handler("TEST", Service::new(Bench, bench_table()))
        .expect("register TEST");
    Arc::new(registry)
}

fn call(
    dispatcher: &Dispatcher,
    protocol: ContentKind,
    method: &str,
    params: Vec<Value>,
) -> Result<Value, rpcmux::InvokeError> {
    Invoker::new(protocol, Loopback::new(dispatcher)).invoke(method, params)
}

#[rstest]
fn greets_in_every_protocol(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
) {
    let dispatcher = Dispatcher::new(registry);
    let result = call(&dispatcher, protocol, "TEST.hello", vec![json!("World")]).expect("hello");
    assert_eq!(result, json!("Hello World!"));
}

#[rstest]
#[case::integer(json!(5), "integer 5")]
#[case::text(json!("5"), "text 5")]
fn overloads_follow_argument_types(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
    #[case] argument: Value,
    #[case] expected: &str,
) {
    let dispatcher = Dispatcher::new(registry);
    let result = call(&dispatcher, protocol, "TEST.describe", vec![argument]).expect("describe");
    assert_eq!(result, json!(expected));
}

#[rstest]
fn loose_pass_coerces_numeric_text(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
) {
    let dispatcher = Dispatcher::new(registry);
    let result = call(&dispatcher, protocol, "TEST.add", vec![json!("2"), json!(" 3 ")])
        .expect("add");
    assert_eq!(result, json!(5));
}

#[rstest]
fn sequences_and_structs_round_trip(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
) {
    let dispatcher = Dispatcher::new(registry);
    let sum = call(&dispatcher, protocol, "TEST.sum", vec![json!([1, 2, 3])]).expect("sum");
    assert_eq!(sum, json!(6));

    let mirrored = call(&dispatcher, protocol, "TEST.mirror", vec![json!({"x": 1, "y": 2})])
        .expect("mirror");
    assert_eq!(mirrored, json!({"x": 2, "y": 1}));
}

#[rstest]
#[case::json(ContentKind::Json)]
#[case::soap(ContentKind::Soap)]
fn null_results_are_returned(registry: Arc<HandlerRegistry>, #[case] protocol: ContentKind) {
    let dispatcher = Dispatcher::new(registry);
    let result = call(&dispatcher, protocol, "TEST.nothing", vec![]).expect("nothing");
    assert_eq!(result, Value::Null);
}

#[rstest]
fn application_faults_reach_the_caller(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
) {
    let dispatcher = Dispatcher::new(registry);
    let error = call(&dispatcher, protocol, "TEST.refuse", vec![json!("closed")])
        .expect_err("refused");
    let fault = error.fault().expect("remote fault");
    assert_eq!(fault.code(), 4001);
    assert_eq!(fault.message(), "closed");
}

#[rstest]
#[case::unknown_method("TEST.absent", FaultKind::MethodNotFound)]
#[case::unknown_handler("OTHER.hello", FaultKind::MethodNotFound)]
#[case::bare_name("hello", FaultKind::InvalidRequest)]
fn resolution_faults_reach_the_caller(
    registry: Arc<HandlerRegistry>,
    #[values(ContentKind::Json, ContentKind::XmlRpc, ContentKind::Soap)] protocol: ContentKind,
    #[case] method: &str,
    #[case] expected: FaultKind,
) {
    let dispatcher = Dispatcher::new(registry);
    let error = call(&dispatcher, protocol, method, vec![json!("World")]).expect_err("fault");
    assert_eq!(error.fault().map(Fault::kind), Some(expected));
}

#[derive(Default)]
struct CountingAudit {
    invocations: AtomicUsize,
}

impl Audit for CountingAudit {
    fn before_invoke(&self, context: &AuditContext<'_>) -> anyhow::Result<Option<Value>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if context.method_name == "hello" && context.args.first() == Some(&json!("Mallory")) {
            return Err(Fault::remote(403, "Mallory is not allowed", None).into());
        }
        Ok(None)
    }

    fn after_invoke(
        &self,
        _context: &AuditContext<'_>,
        _started: Instant,
        _outcome: Result<&Value, &anyhow::Error>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}

#[rstest]
fn audit_sees_every_invocation(registry: Arc<HandlerRegistry>) {
    let audit = Arc::new(CountingAudit::default());
    let dispatcher = Dispatcher::builder()
        .registry(registry)
        .audit(Arc::clone(&audit))
        .build();

    let greeting = call(&dispatcher, ContentKind::Json, "TEST.hello", vec![json!("Ada")]);
    assert_eq!(greeting.expect("hello"), json!("Hello Ada!"));

    let refused = call(&dispatcher, ContentKind::XmlRpc, "TEST.hello", vec![json!("Mallory")])
        .expect_err("audit refusal");
    assert_eq!(refused.fault().map(Fault::code), Some(403));

    assert_eq!(audit.invocations.load(Ordering::SeqCst), 2);
}
