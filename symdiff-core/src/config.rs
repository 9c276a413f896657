/// Log topological order of evaluated graph
pub const DEBUG_ORDER: u32 = 1;
/// Log inferred shapes
pub const DEBUG_SHAPES: u32 = 2;
/// Log evaluated graph in dot format
pub const DEBUG_DOT: u32 = 4;

/// Executor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Infer shapes and compile kernels ahead of evaluation,
    /// repeated only when shapes of bound inputs change.
    pub infer_shapes: bool,
    /// Bitmask of `DEBUG_*` flags
    pub debug: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            infer_shapes: true,
            debug: 0,
        }
    }
}

impl Config {
    /// Default config overridden by environment variables
    /// `SYMDIFF_INFER_SHAPES` (0 or 1) and `SYMDIFF_DEBUG` (bitmask).
    /// Values that fail to parse are ignored.
    ///
    /// This is what [`crate::runtime::Executor::new`] and
    /// [`crate::runtime::evaluate`] use.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("SYMDIFF_INFER_SHAPES").ok().as_deref(),
            std::env::var("SYMDIFF_DEBUG").ok().as_deref(),
        )
    }

    fn from_vars(infer_shapes: Option<&str>, debug: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(x) = infer_shapes.and_then(|x| x.trim().parse::<u8>().ok()) {
            config.infer_shapes = x != 0;
        }
        if let Some(x) = debug.and_then(|x| x.trim().parse::<u32>().ok()) {
            config.debug = x;
        }
        config
    }

    pub(crate) const fn debug_order(&self) -> bool {
        self.debug & DEBUG_ORDER != 0
    }

    pub(crate) const fn debug_shapes(&self) -> bool {
        self.debug & DEBUG_SHAPES != 0
    }

    pub(crate) const fn debug_dot(&self) -> bool {
        self.debug & DEBUG_DOT != 0
    }
}
