//! Extension points invoked by the transaction executor.
//!
//! Each named point holds zero or more handlers, invoked in registration
//! order. At the frame points a handler may return a replacement frame;
//! the first handler that does short-circuits the chain and its value is
//! used in place of the original. The hook set is owned per master
//! instance, not process-wide.
//!
//! ```rust
//! use rtu_master::hooks::MasterHooks;
//!
//! let mut hooks = MasterHooks::new();
//! hooks.on_before_send(|frame| {
//!     // Observe only: returning None leaves the frame untouched.
//!     println!("sending {} bytes", frame.len());
//!     None
//! });
//! ```

/// A handler at a frame interception point. Returning `Some` replaces the
/// frame and stops the chain.
pub type FrameHook = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A side-effect-only handler.
pub type NotifyHook = Box<dyn FnMut() + Send>;

/// The named interception points of one master instance.
#[derive(Default)]
pub struct MasterHooks {
    before_send: Vec<FrameHook>,
    after_send: Vec<NotifyHook>,
    after_receive: Vec<FrameHook>,
}

impl MasterHooks {
    /// Create an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked with the outgoing frame before it is
    /// transmitted. May replace the frame.
    pub fn on_before_send<F>(&mut self, hook: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.before_send.push(Box::new(hook));
    }

    /// Register a handler invoked after the frame has been transmitted.
    /// Side effects only.
    pub fn on_after_send<F>(&mut self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.after_send.push(Box::new(hook));
    }

    /// Register a handler invoked with the received frame before it is
    /// validated. May replace the frame.
    pub fn on_after_receive<F>(&mut self, hook: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.after_receive.push(Box::new(hook));
    }

    /// Remove every registered handler.
    pub fn clear(&mut self) {
        self.before_send.clear();
        self.after_send.clear();
        self.after_receive.clear();
    }

    pub(crate) fn run_before_send(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        first_replacement(&mut self.before_send, frame)
    }

    pub(crate) fn run_after_send(&mut self) {
        for hook in &mut self.after_send {
            hook();
        }
    }

    pub(crate) fn run_after_receive(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        first_replacement(&mut self.after_receive, frame)
    }
}

impl std::fmt::Debug for MasterHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterHooks")
            .field("before_send", &self.before_send.len())
            .field("after_send", &self.after_send.len())
            .field("after_receive", &self.after_receive.len())
            .finish()
    }
}

fn first_replacement(hooks: &mut [FrameHook], frame: &[u8]) -> Option<Vec<u8>> {
    for hook in hooks {
        if let Some(replacement) = hook(frame) {
            return Some(replacement);
        }
    }
    None
}
