use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use globset::{Glob, GlobMatcher};
use tokio::runtime::Handle;

use crate::{
    RelayflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, GraphEvent, Log, Message, RunEvent},
    model::RunError,
    runtime::RunId,
};

pub type RunEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type RunLogHandle = Arc<dyn Fn(&Event<Log>) + Send + Sync>;
pub type RunEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type RunLogHandleAsync = Arc<dyn Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Glob filters applied to the run id and node id of every published item.
///
/// Run-level items carry an empty node id, which only `*` matches.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// eg. `3f2a*`
    pub rid: String,
    /// eg. `notify*`
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            rid: "*".to_string(),
            nid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn new(
        rid: &str,
        nid: &str,
    ) -> Self {
        Self {
            rid: rid.to_string(),
            nid: nid.to_string(),
        }
    }

    pub fn with_rid(rid: &str) -> Self {
        Self::new(rid, "*")
    }

    pub fn with_nid(nid: &str) -> Self {
        Self::new("*", nid)
    }
}

/// Something published on the channel for a run and node.
trait Scoped {
    fn rid(&self) -> &str;
    fn nid(&self) -> &str;
}

impl Scoped for Event<Message> {
    fn rid(&self) -> &str {
        &self.rid
    }

    fn nid(&self) -> &str {
        &self.nid
    }
}

impl Scoped for Event<Log> {
    fn rid(&self) -> &str {
        &self.rid
    }

    fn nid(&self) -> &str {
        &self.nid
    }
}

#[derive(Debug, Clone)]
struct Filter {
    rid: GlobMatcher,
    nid: GlobMatcher,
}

impl Filter {
    fn compile(options: &ChannelOptions) -> Result<Self> {
        let compile = |pattern: &str| Glob::new(pattern).map(|g| g.compile_matcher()).map_err(|e| RelayflowError::Config(format!("invalid channel pattern '{}': {}", pattern, e)));
        Ok(Self {
            rid: compile(&options.rid)?,
            nid: compile(&options.nid)?,
        })
    }

    fn matches(
        &self,
        item: &impl Scoped,
    ) -> bool {
        self.rid.is_match(item.rid()) && self.nid.is_match(item.nid())
    }
}

/// Subscriber lists for one kind of published item.
struct Handles<T> {
    sync: ShareLock<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
    deferred: ShareLock<Vec<Arc<dyn Fn(&T) -> BoxFuture<'static, ()> + Send + Sync>>>,
}

impl<T> Clone for Handles<T> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            deferred: self.deferred.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Handles<T> {
    fn new() -> Self {
        Self {
            sync: Arc::new(RwLock::new(Vec::new())),
            deferred: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Call the sync subscribers in place, the async ones on a spawned task.
    fn dispatch(
        &self,
        item: T,
    ) {
        if let Ok(handlers) = self.sync.read() {
            for handle in handlers.iter() {
                (handle)(&item);
            }
        }

        let handlers = match self.deferred.read() {
            Ok(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return,
        };
        tokio::spawn(async move {
            for handle in handlers.iter() {
                (handle)(&item).await;
            }
        });
    }
}

/// Broadcast bus for run events and logs.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,
    log_queue: Arc<BroadcastQueue<Event<Log>>>,

    events: Handles<Event<Message>>,
    logs: Handles<Event<Log>>,

    handle: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(
        handle: Handle,
        event_queue_size: usize,
        log_queue_size: usize,
    ) -> Self {
        Self {
            event_queue: BroadcastQueue::new(event_queue_size),
            log_queue: BroadcastQueue::new(log_queue_size),
            events: Handles::new(),
            logs: Handles::new(),
            handle,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn log_queue(&self) -> Arc<BroadcastQueue<Event<Log>>> {
        self.log_queue.clone()
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Event<Message>>> {
        self.event_queue.clone()
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let mut log_queue = self.log_queue.subscribe();
        let events = self.events.clone();
        let logs = self.logs.clone();

        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(e) = event_queue.recv() => events.dispatch(e),
                    Ok(log) = log_queue.recv() => logs.dispatch(log),
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Filtered subscription on a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,
    filter: Filter,
}

impl ChannelEvent {
    /// Fails with a config error when a pattern is not a valid glob.
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        Ok(Self {
            channel,
            filter: Filter::compile(&options)?,
        })
    }

    pub fn on_complete(
        &self,
        f: impl Fn(RunId) + Send + Sync + 'static,
    ) {
        self.on_event(move |e| {
            if e.event.is_complete() {
                f(e.rid.clone());
            }
        });
    }

    /// Called with the run id and the failure that ended the run.
    pub fn on_error(
        &self,
        f: impl Fn(RunId, &RunError) + Send + Sync + 'static,
    ) {
        self.on_event(move |e| {
            if let GraphEvent::Run(RunEvent::Failed(err)) = &e.event {
                f(e.rid.clone(), err);
            }
        });
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let filter = self.filter.clone();
        let handle: RunEventHandle = Arc::new(move |e| {
            if filter.matches(e) {
                f(e);
            }
        });
        push(&self.channel.events.sync, handle);
    }

    pub fn on_log(
        &self,
        f: impl Fn(&Event<Log>) + Send + Sync + 'static,
    ) {
        let filter = self.filter.clone();
        let handle: RunLogHandle = Arc::new(move |e| {
            if filter.matches(e) {
                f(e);
            }
        });
        push(&self.channel.logs.sync, handle);
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let filter = self.filter.clone();
        let handle: RunEventHandleAsync = Arc::new(move |e| if filter.matches(e) { f(e) } else { Box::pin(async {}) });
        push(&self.channel.events.deferred, handle);
    }

    pub fn on_log_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Log>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let filter = self.filter.clone();
        let handle: RunLogHandleAsync = Arc::new(move |e| if filter.matches(e) { f(e) } else { Box::pin(async {}) });
        push(&self.channel.logs.deferred, handle);
    }
}

fn push<H>(
    handles: &ShareLock<Vec<H>>,
    handle: H,
) {
    if let Ok(mut handles) = handles.write() {
        handles.push(handle);
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Mutex, time::Duration};

    use super::*;
    use crate::{events::NodeEvent, model::LogLevel};

    fn message(
        rid: &str,
        nid: &str,
        event: GraphEvent,
    ) -> Event<Message> {
        Event::new(&Message {
            rid: rid.to_string(),
            nid: nid.to_string(),
            event,
        })
    }

    #[test]
    fn test_filter_matches_globs() {
        let filter = Filter::compile(&ChannelOptions::new("run-1*", "notify*")).unwrap();
        assert!(filter.matches(&message("run-12", "notify_admin", GraphEvent::Node(NodeEvent::Succeeded(0)))));
        assert!(!filter.matches(&message("run-2", "notify_admin", GraphEvent::Node(NodeEvent::Succeeded(0)))));
        assert!(!filter.matches(&message("run-12", "", GraphEvent::Run(RunEvent::Completed))));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Filter::compile(&ChannelOptions::with_rid("run-[")).unwrap_err();
        assert!(matches!(err, RelayflowError::Config(_)));
    }

    #[tokio::test]
    async fn test_subscribers_receive_matching_items() {
        let channel = Arc::new(Channel::new(Handle::current(), 16, 16));
        channel.listen();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let events = ChannelEvent::channel(channel.clone(), ChannelOptions::with_rid("a*")).unwrap();
        let sink = seen.clone();
        events.on_complete(move |rid| sink.lock().unwrap().push(format!("complete {}", rid)));
        let sink = seen.clone();
        events.on_log(move |l| sink.lock().unwrap().push(l.content.clone()));

        channel.event_queue().send(message("b1", "", GraphEvent::Run(RunEvent::Completed))).unwrap();
        channel.log_queue().send(Event::new(&Log {
            rid: "a1".to_string(),
            nid: "start".to_string(),
            level: LogLevel::Info,
            content: "hello".to_string(),
            timestamp: 0,
        }))
        .unwrap();
        channel.event_queue().send(message("a1", "", GraphEvent::Run(RunEvent::Completed))).unwrap();

        for _ in 0..100 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["complete a1".to_string(), "hello".to_string()]);
        channel.shutdown();
    }
}
