//! Doubles shared by dispatch tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::anyhow;
use serde_json::Value;

use crate::fault::Fault;
use crate::handler::{MethodTable, Service};
use crate::hooks::{Audit, AuditContext, TraceRecord, Tracer};
use crate::registry::HandlerRegistry;
use crate::sniff::ContentKind;
use crate::transport::{RawRequest, Transport};

pub(crate) struct Greeter;

/// Registry holding `TEST` with `hello`, `fail` and `deny`.
pub(crate) fn greeter_registry() -> Arc<HandlerRegistry> {
    let table = MethodTable::new()
        .method("hello", |_: &Greeter, name: String| {
            Ok::<_, anyhow::Error>(format!("Hello {name}!"))
        })
        .method("fail", |_: &Greeter, name: String| {
            Err::<String, _>(anyhow!("greeting refused for {name}"))
        })
        .method("deny", |_: &Greeter, name: String| {
            Err::<String, _>(Fault::remote(
                1001,
                format!("{name} is not welcome"),
                Some(Value::from("blocklist")),
            ))
        });
    let registry = HandlerRegistry::new();
    registry
        .add_handler("TEST", Service::new(Greeter, table))
        .expect("register TEST");
    Arc::new(registry)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Written {
    pub(crate) content_type: String,
    pub(crate) body: String,
    pub(crate) chunked: bool,
}

/// Transport serving one canned request and recording what is written.
pub(crate) struct RecordingTransport {
    request: Option<RawRequest>,
    authorize: bool,
    fail_writes: bool,
    encoding: Option<String>,
    pub(crate) declared: Option<Option<ContentKind>>,
    pub(crate) authorized: Mutex<Vec<String>>,
    pub(crate) writes: Vec<Written>,
}

impl RecordingTransport {
    pub(crate) fn new(request: RawRequest) -> Self {
        Self {
            request: Some(request),
            authorize: true,
            fail_writes: false,
            encoding: None,
            declared: None,
            authorized: Mutex::new(Vec::new()),
            writes: Vec::new(),
        }
    }

    pub(crate) fn unreadable() -> Self {
        let mut transport = Self::new(RawRequest::default());
        transport.request = None;
        transport
    }

    pub(crate) fn refusing(mut self) -> Self {
        self.authorize = false;
        self
    }

    pub(crate) fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub(crate) fn single_body(&self) -> &str {
        assert_eq!(self.writes.len(), 1, "expected exactly one response");
        &self.writes[0].body
    }
}

impl Transport for RecordingTransport {
    fn read_request(&mut self, declared: Option<ContentKind>) -> io::Result<RawRequest> {
        self.declared = Some(declared);
        self.request
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset"))
    }

    fn check_authorization(&self, method: &str) -> bool {
        self.authorized.lock().expect("lock").push(method.to_owned());
        self.authorize
    }

    fn write_response(&mut self, content_type: &str, body: &str, chunked: bool) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
        }
        self.writes.push(Written {
            content_type: content_type.to_owned(),
            body: body.to_owned(),
            chunked,
        });
        Ok(())
    }

    fn encoding(&self) -> Option<String> {
        self.encoding.clone()
    }

    fn set_encoding(&mut self, encoding: &str) {
        self.encoding = Some(encoding.to_owned());
    }
}

/// In-memory log sink usable as a `tracing-subscriber` writer.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Traced {
    pub(crate) protocol: ContentKind,
    pub(crate) response: Option<String>,
    pub(crate) method: Option<String>,
    pub(crate) failure: Option<String>,
}

/// Tracer recording every call; optionally failing each one.
#[derive(Default)]
pub(crate) struct RecordingTracer {
    fail: bool,
    pub(crate) records: Mutex<Vec<Traced>>,
}

impl RecordingTracer {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            records: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn records(&self) -> Vec<Traced> {
        self.records.lock().expect("lock").clone()
    }
}

impl Tracer for RecordingTracer {
    fn trace(&self, record: &TraceRecord<'_>) -> anyhow::Result<()> {
        self.records.lock().expect("lock").push(Traced {
            protocol: record.protocol,
            response: record.response.map(str::to_owned),
            method: record.method.map(str::to_owned),
            failure: record.failure.map(str::to_owned),
        });
        if self.fail {
            return Err(anyhow!("trace sink unavailable"));
        }
        Ok(())
    }
}

type BeforeScript = Box<dyn Fn() -> anyhow::Result<Option<Value>> + Send + Sync>;
type AfterScript =
    Box<dyn Fn(Result<&Value, &anyhow::Error>) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Audit whose hooks run scripted closures and count their calls.
#[derive(Default)]
pub(crate) struct ScriptedAudit {
    before: Option<BeforeScript>,
    after: Option<AfterScript>,
    before_calls: AtomicUsize,
    after_calls: AtomicUsize,
}

impl ScriptedAudit {
    pub(crate) fn before(
        mut self,
        script: impl Fn() -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Box::new(script));
        self
    }

    pub(crate) fn after(
        mut self,
        script: impl Fn(Result<&Value, &anyhow::Error>) -> anyhow::Result<Option<Value>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.after = Some(Box::new(script));
        self
    }

    pub(crate) fn before_calls(&self) -> usize {
        self.before_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn after_calls(&self) -> usize {
        self.after_calls.load(Ordering::SeqCst)
    }
}

impl Audit for ScriptedAudit {
    fn before_invoke(&self, _context: &AuditContext<'_>) -> anyhow::Result<Option<Value>> {
        self.before_calls.fetch_add(1, Ordering::SeqCst);
        self.before.as_ref().map_or(Ok(None), |script| script())
    }

    fn after_invoke(
        &self,
        _context: &AuditContext<'_>,
        _started: Instant,
        outcome: Result<&Value, &anyhow::Error>,
    ) -> anyhow::Result<Option<Value>> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        self.after.as_ref().map_or(Ok(None), |script| script(outcome))
    }
}
