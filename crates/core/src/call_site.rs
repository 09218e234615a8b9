//! Call-site identity and resolution
//!
//! Instrumented operations are `#[track_caller]`, so the location of the
//! user's call is available as a `&'static Location`. A [`CallSiteResolver`]
//! turns that location into a [`CallSite`], optionally naming the enclosing
//! function.
//!
//! Resolution happens once per call, at entry, and only when slow detection
//! is enabled. [`BacktraceResolver`] only records the raw stack there;
//! symbols are looked up the first time the function name is read, which in
//! practice means only when a diagnostic is written.

use backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Identity of the code that invoked an instrumented operation
///
/// `function` is `None` when the resolver cannot name the enclosing
/// function ([`LocationResolver`] never does).
#[derive(Debug, Clone)]
pub struct CallSite {
    function: FunctionName,
    file: Cow<'static, str>,
    line: u32,
}

#[derive(Clone)]
enum FunctionName {
    Unknown,
    Known(Cow<'static, str>),
    Deferred(Arc<DeferredName>),
}

/// Unsymbolised stack, resolved at most once
struct DeferredName {
    trace: Backtrace,
    caller: &'static Location<'static>,
    name: OnceLock<Option<String>>,
}

impl DeferredName {
    fn get(&self) -> Option<&str> {
        self.name
            .get_or_init(|| {
                let mut trace = self.trace.clone();
                trace.resolve();
                enclosing_function(&trace, self.caller)
            })
            .as_deref()
    }
}

impl fmt::Debug for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionName::Unknown => f.write_str("Unknown"),
            FunctionName::Known(name) => f.debug_tuple("Known").field(name).finish(),
            FunctionName::Deferred(deferred) => match deferred.name.get() {
                Some(name) => f.debug_tuple("Deferred").field(name).finish(),
                None => f.write_str("Deferred(<unresolved>)"),
            },
        }
    }
}

impl CallSite {
    /// Create a fully specified call site
    pub fn new(
        function: impl Into<Cow<'static, str>>,
        file: impl Into<Cow<'static, str>>,
        line: u32,
    ) -> Self {
        Self {
            function: FunctionName::Known(function.into()),
            file: file.into(),
            line,
        }
    }

    /// Create a call site from a caller location, without a function name
    pub fn from_location(location: &'static Location<'static>) -> Self {
        Self {
            function: FunctionName::Unknown,
            file: Cow::Borrowed(location.file()),
            line: location.line(),
        }
    }

    /// Call site whose function name is looked up in `trace` on first use
    ///
    /// `trace` is normally [`Backtrace::new_unresolved`] captured while the
    /// caller's frame is still on the stack.
    pub fn deferred(location: &'static Location<'static>, trace: Backtrace) -> Self {
        Self {
            function: FunctionName::Deferred(Arc::new(DeferredName {
                trace,
                caller: location,
                name: OnceLock::new(),
            })),
            file: Cow::Borrowed(location.file()),
            line: location.line(),
        }
    }

    /// Attach a function name
    pub fn with_function(mut self, function: impl Into<Cow<'static, str>>) -> Self {
        self.function = FunctionName::Known(function.into());
        self
    }

    /// Enclosing function, if known
    ///
    /// For a deferred call site the first call symbolises the stack.
    pub fn function(&self) -> Option<&str> {
        match &self.function {
            FunctionName::Unknown => None,
            FunctionName::Known(name) => Some(&**name),
            FunctionName::Deferred(deferred) => deferred.get(),
        }
    }

    /// Source file
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Source line
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line && self.file == other.file && self.function() == other.function()
    }
}

impl Eq for CallSite {}

impl Hash for CallSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
        self.line.hash(state);
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function() {
            Some(function) => write!(f, "{} ({}:{})", function, self.file, self.line),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Capability that resolves the caller of an instrumented operation
///
/// Any `Fn(&'static Location<'static>) -> CallSite` closure is a resolver,
/// which lets tests inject synthetic call sites.
pub trait CallSiteResolver: Send + Sync {
    /// Resolve the call site for the given caller location
    fn resolve(&self, caller: &'static Location<'static>) -> CallSite;
}

impl<F> CallSiteResolver for F
where
    F: Fn(&'static Location<'static>) -> CallSite + Send + Sync,
{
    fn resolve(&self, caller: &'static Location<'static>) -> CallSite {
        self(caller)
    }
}

/// File and line straight from the caller location
///
/// Does not allocate and never walks the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationResolver;

impl CallSiteResolver for LocationResolver {
    fn resolve(&self, caller: &'static Location<'static>) -> CallSite {
        CallSite::from_location(caller)
    }
}

/// Default resolver: file, line and the enclosing function
///
/// Records an unresolved stack per call and defers symbol lookup until the
/// name is first read. Falls back to file and line when no frame matches
/// (stripped binaries, missing debug info).
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceResolver;

impl CallSiteResolver for BacktraceResolver {
    fn resolve(&self, caller: &'static Location<'static>) -> CallSite {
        CallSite::deferred(caller, Backtrace::new_unresolved())
    }
}

/// Name of the frame at `caller`, or failing that the first frame in its file
fn enclosing_function(trace: &Backtrace, caller: &Location<'_>) -> Option<String> {
    let caller_file = Path::new(caller.file());
    let mut same_file = None;

    for symbol in trace.frames().iter().flat_map(|frame| frame.symbols()) {
        let (Some(file), Some(name)) = (symbol.filename(), symbol.name()) else {
            continue;
        };
        if !file.ends_with(caller_file) {
            continue;
        }
        // Alternate formatting drops the trailing `::h<hash>`.
        let name = format!("{:#}", name);
        if symbol.lineno() == Some(caller.line()) {
            return Some(name);
        }
        same_file.get_or_insert(name);
    }

    same_file
}
