//! Scripted decoder backend for unit tests
//!
//! Records every call a pane makes and replays a queue of events through
//! `wait_event`, so the pipeline can be exercised without a real decoder.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use gridcast_mpv::{
    DecoderBackend, DecoderError, DecoderEvent, DecoderHandle, PropertyFormat, PropertyValue,
    Result as DecoderResult, StreamSource,
};

struct BackendShared {
    events: Mutex<VecDeque<DecoderEvent>>,
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
    fail_initialize: Mutex<HashSet<usize>>,
}

/// Factory that mints [`ScriptedHandle`]s and keeps them inspectable.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    shared: Arc<BackendShared>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(BackendShared {
                events: Mutex::new(VecDeque::new()),
                handles: Mutex::new(Vec::new()),
                fail_initialize: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Queue an event; any live handle's `wait_event` will drain it.
    pub(crate) fn push_event(&self, event: DecoderEvent) {
        self.shared.events.lock().push_back(event);
    }

    /// The n-th handle ever created.
    pub(crate) fn handle(&self, index: usize) -> Arc<ScriptedHandle> {
        self.shared.handles.lock()[index].clone()
    }

    /// How many handles have been created.
    pub(crate) fn created(&self) -> usize {
        self.shared.handles.lock().len()
    }

    /// Make `initialize` fail on the n-th created handle.
    pub(crate) fn fail_initialize_for(&self, index: usize) {
        self.shared.fail_initialize.lock().insert(index);
    }
}

impl DecoderBackend for ScriptedBackend {
    fn create_handle(&self) -> DecoderResult<Arc<dyn DecoderHandle>> {
        let mut handles = self.shared.handles.lock();
        let handle = Arc::new(ScriptedHandle {
            index: handles.len(),
            shared: self.shared.clone(),
            options: Mutex::new(Vec::new()),
            properties: Mutex::new(HashMap::new()),
            property_writes: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            log_level: Mutex::new(None),
            stream: Mutex::new(None),
        });
        handles.push(handle.clone());
        Ok(handle)
    }
}

/// One scripted decoder instance.
pub(crate) struct ScriptedHandle {
    index: usize,
    shared: Arc<BackendShared>,
    options: Mutex<Vec<(String, PropertyValue)>>,
    properties: Mutex<HashMap<String, PropertyValue>>,
    property_writes: Mutex<Vec<(String, PropertyValue)>>,
    commands: Mutex<Vec<Vec<String>>>,
    initialized: AtomicBool,
    log_level: Mutex<Option<String>>,
    stream: Mutex<Option<(String, Arc<dyn StreamSource>)>>,
}

impl ScriptedHandle {
    /// Preset a property the pipeline will later read.
    pub(crate) fn set_scripted_property(&self, name: &str, value: PropertyValue) {
        self.properties.lock().insert(name.to_string(), value);
    }

    /// Values written to `name` via `set_property`, in order.
    pub(crate) fn property_writes(&self, name: &str) -> Vec<PropertyValue> {
        self.property_writes
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub(crate) fn clear_property_writes(&self) {
        self.property_writes.lock().clear();
    }

    /// The last value set for option `name`, if any.
    pub(crate) fn option(&self, name: &str) -> Option<PropertyValue> {
        self.options
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Whether option `name` was ever set.
    pub(crate) fn has_option(&self, name: &str) -> bool {
        self.options.lock().iter().any(|(n, _)| n == name)
    }

    /// Every command issued, in order.
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().clone()
    }

    pub(crate) fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    pub(crate) fn requested_log_level(&self) -> Option<String> {
        self.log_level.lock().clone()
    }

    pub(crate) fn stream_scheme(&self) -> Option<String> {
        self.stream.lock().as_ref().map(|(scheme, _)| scheme.clone())
    }

    pub(crate) fn stream_source(&self) -> Option<Arc<dyn StreamSource>> {
        self.stream.lock().as_ref().map(|(_, source)| source.clone())
    }
}

impl DecoderHandle for ScriptedHandle {
    fn set_option(&self, name: &str, value: PropertyValue) -> DecoderResult<()> {
        self.options.lock().push((name.to_string(), value));
        Ok(())
    }

    fn initialize(&self) -> DecoderResult<()> {
        if self.shared.fail_initialize.lock().contains(&self.index) {
            return Err(DecoderError::Call {
                call: "initialize",
                args: String::new(),
                code: -20,
                message: "scripted initialization failure".to_string(),
            });
        }
        self.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn command(&self, args: &[&str]) -> DecoderResult<()> {
        self.commands
            .lock()
            .push(args.iter().map(|a| (*a).to_string()).collect());
        Ok(())
    }

    fn get_property(&self, name: &str, format: PropertyFormat) -> DecoderResult<PropertyValue> {
        match self.properties.lock().get(name) {
            Some(value) if value.format() == format => Ok(value.clone()),
            _ => Err(DecoderError::Call {
                call: "get_property",
                args: name.to_string(),
                code: -8,
                message: "property not found".to_string(),
            }),
        }
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> DecoderResult<()> {
        self.property_writes
            .lock()
            .push((name.to_string(), value.clone()));
        self.properties.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn request_log_messages(&self, min_level: &str) -> DecoderResult<()> {
        *self.log_level.lock() = Some(min_level.to_string());
        Ok(())
    }

    fn register_stream_source(
        &self,
        scheme: &str,
        source: Arc<dyn StreamSource>,
    ) -> DecoderResult<()> {
        *self.stream.lock() = Some((scheme.to_string(), source));
        Ok(())
    }

    fn wait_event(&self, timeout: Duration) -> DecoderEvent {
        if let Some(event) = self.shared.events.lock().pop_front() {
            return event;
        }
        std::thread::sleep(timeout.min(Duration::from_millis(2)));
        DecoderEvent::None
    }
}

/// Spin until `condition` holds or `timeout` elapses; returns whether the
/// condition was met.
pub(crate) fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
