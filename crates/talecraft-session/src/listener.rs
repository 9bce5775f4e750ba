use talecraft_client::ApiError;

/// Receives the outcome of one generation session.
///
/// Calls arrive from the session's background task, in server order. After
/// `on_complete`, `on_error` or `on_cancelled` nothing else is delivered.
/// Implementations must not block: `cancel` and `start` on the slot wait
/// for an in-flight callback to return.
pub trait GenerationListener: Send + Sync {
    /// Text generated so far (cumulative, not the latest delta)
    fn on_chunk(&self, text: &str);

    /// Final text of the session
    fn on_complete(&self, text: &str);

    fn on_error(&self, error: &ApiError);

    fn on_cancelled(&self) {}
}

type TextCallback = Box<dyn Fn(&str) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&ApiError) + Send + Sync>;

/// Listener assembled from closures
pub struct CallbackListener {
    on_chunk: TextCallback,
    on_complete: TextCallback,
    on_error: ErrorCallback,
    on_cancelled: Option<Box<dyn Fn() + Send + Sync>>,
}

impl CallbackListener {
    pub fn new<C, D, E>(on_chunk: C, on_complete: D, on_error: E) -> Self
    where
        C: Fn(&str) + Send + Sync + 'static,
        D: Fn(&str) + Send + Sync + 'static,
        E: Fn(&ApiError) + Send + Sync + 'static,
    {
        Self {
            on_chunk: Box::new(on_chunk),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
            on_cancelled: None,
        }
    }

    pub fn with_on_cancelled<F>(mut self, on_cancelled: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancelled = Some(Box::new(on_cancelled));
        self
    }
}

impl GenerationListener for CallbackListener {
    fn on_chunk(&self, text: &str) {
        (self.on_chunk)(text)
    }

    fn on_complete(&self, text: &str) {
        (self.on_complete)(text)
    }

    fn on_error(&self, error: &ApiError) {
        (self.on_error)(error)
    }

    fn on_cancelled(&self) {
        if let Some(callback) = &self.on_cancelled {
            callback()
        }
    }
}
