//! In-memory log capture for tests
//!
//! One capture layer is installed per test binary. Tests running in
//! parallel share it, so lookups are keyed by operation and treespace.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use treespace_core_types::schema::{FIELD_COMPONENT, FIELD_EVENT, FIELD_OP, FIELD_TREESPACE};

/// One recorded log event, every field rendered as a string
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub component: Option<String>,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn belongs_to(&self, op: &str, treespace: &str) -> bool {
        self.op.as_deref() == Some(op) && self.field(FIELD_TREESPACE) == Some(treespace)
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

type Sink = Arc<Mutex<Vec<CapturedEvent>>>;

struct CaptureLayer {
    sink: Sink,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let fields = fields.0;
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            component: fields.get(FIELD_COMPONENT).cloned(),
            op: fields.get(FIELD_OP).cloned(),
            event: fields.get(FIELD_EVENT).cloned(),
            fields,
        };
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).push(captured);
    }
}

/// Handle on the events recorded so far
#[derive(Clone)]
pub struct TestCapture {
    sink: Sink,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events of `op` logged against `treespace`, in emission order
    pub fn operation(&self, op: &str, treespace: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.belongs_to(op, treespace))
            .collect()
    }

    /// The `event` names of [`TestCapture::operation`], e.g.
    /// `["start", "end"]`
    pub fn boundaries(&self, op: &str, treespace: &str) -> Vec<String> {
        self.operation(op, treespace)
            .into_iter()
            .filter_map(|e| e.event)
            .collect()
    }
}

static CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer (first call only) and return its handle
pub fn init_test_capture() -> TestCapture {
    CAPTURE
        .get_or_init(|| {
            let sink = Sink::default();
            // another subscriber may already own the global slot
            let _ = tracing_subscriber::registry()
                .with(CaptureLayer {
                    sink: Arc::clone(&sink),
                })
                .try_init();
            TestCapture { sink }
        })
        .clone()
}
