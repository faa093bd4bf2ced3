//! Embedded script host for nvtool.
//!
//! Owns the scripting engine, binds the one native bridge function
//! (`nvlist_add_string`) and the bag handle (`nvl`) into the script
//! namespace, and runs script fragments strictly in order. The engine is a
//! black box here: register a native function, bind a global, evaluate
//! source to completion.
//!
//! Error severity is deliberately asymmetric. Argument-shape and
//! handle-resolution failures are raised into the script and a script may
//! catch them. Bag-layer failures (duplicate key, invalid key/value) latch a
//! fatal error the host checks after every fragment, so they end the run
//! even if the script caught the raised error.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope, INT};

use nvtool_bag::{BagError, NvBag};

/// Script-visible name of the bag handle.
pub const NVL_GLOBAL: &str = "nvl";
/// Script-visible name of the bridge function.
pub const BRIDGE_FN: &str = "nvlist_add_string";

/// Tokens start away from zero so small script integers never resolve.
const TOKEN_BASE: INT = 0x6e76_6c01;

type BagSlot = Rc<RefCell<NvBag>>;

#[derive(Debug)]
pub enum HostError {
    EngineInit { why: String },
    Script { why: String },
    Fatal { source: BagError },
    Teardown,
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::EngineInit { why } => {
                write!(f, "could not initialise script engine: {why}")
            }
            HostError::Script { why } => write!(f, "uncaught script error: {why}"),
            HostError::Fatal { source } => write!(f, "{BRIDGE_FN}: {source}"),
            HostError::Teardown => {
                write!(f, "script engine still holds bag references at teardown")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// What to do when a fragment raises an error no script handler caught.
///
/// The original tool wires the engine's uncaught-error path straight to
/// process exit; `Exit` reproduces that. `Propagate` returns a structured
/// error to the caller instead, which is what the driver and the tests use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    Exit,
    Propagate,
}

/// Token -> owned bag. One live bag at a time; scripts only ever see the
/// opaque token, never an address.
pub struct HandleTable {
    next: INT,
    slot: Option<(INT, BagSlot)>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: TOKEN_BASE,
            slot: None,
        }
    }

    pub fn register(&mut self, bag: BagSlot) -> Result<INT, HostError> {
        if self.slot.is_some() {
            return Err(HostError::EngineInit {
                why: "a bag is already registered".to_string(),
            });
        }
        let token = self.next;
        self.next += 1;
        self.slot = Some((token, bag));
        Ok(token)
    }

    pub fn resolve(&self, token: INT) -> Option<BagSlot> {
        match &self.slot {
            Some((t, slot)) if *t == token => Some(Rc::clone(slot)),
            _ => None,
        }
    }

    pub fn release(&mut self, token: INT) -> Option<BagSlot> {
        match self.slot.take() {
            Some((t, slot)) if t == token => Some(slot),
            other => {
                self.slot = other;
                None
            }
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `Uninitialized -> Ready` is [`ScriptHost::new`], `Ready -> Running ->
/// Ready` is [`ScriptHost::run_scripts`], `-> Torn Down` is
/// [`ScriptHost::into_bag`]. The bag outlives the engine.
pub struct ScriptHost {
    engine: Engine,
    scope: Scope<'static>,
    handles: Rc<RefCell<HandleTable>>,
    token: INT,
    fatal: Rc<RefCell<Option<BagError>>>,
}

impl ScriptHost {
    pub fn new(bag: NvBag) -> Result<Self, HostError> {
        let slot = Rc::new(RefCell::new(bag));
        let mut table = HandleTable::new();
        let token = table.register(slot)?;
        let handles = Rc::new(RefCell::new(table));
        let fatal: Rc<RefCell<Option<BagError>>> = Rc::new(RefCell::new(None));

        let mut engine = Engine::new();
        let bridge_handles = Rc::clone(&handles);
        let bridge_fatal = Rc::clone(&fatal);
        engine.register_fn(
            BRIDGE_FN,
            move |handle: Dynamic,
                  key: Dynamic,
                  value: Dynamic|
                  -> Result<(), Box<EvalAltResult>> {
                let token = require_int(&handle, "nvlist handle")?;
                let key = require_str(key, "key")?;
                let value = require_str(value, "value")?;

                let slot = bridge_handles.borrow().resolve(token).ok_or_else(|| {
                    runtime_err(format!("{BRIDGE_FN}: {token:#x} is not a live nvlist handle"))
                })?;
                if let Err(err) = slot.borrow_mut().add_string(key.as_str(), value.as_str())
                {
                    // Latch first: this must end the run even if the script
                    // catches the raised error.
                    let raised = runtime_err(format!("{BRIDGE_FN}: {err}"));
                    *bridge_fatal.borrow_mut() = Some(err);
                    return Err(raised);
                }
                Ok(())
            },
        );

        // One shared scope: fragments see each other's globals, like the
        // single interpreter heap in the original.
        let mut scope = Scope::new();
        scope.push_constant(NVL_GLOBAL, token);

        Ok(Self {
            engine,
            scope,
            handles,
            token,
            fatal,
        })
    }

    /// Run each fragment to completion, in order. Stops at the first fatal
    /// or uncaught error; a latched bag error takes precedence over the
    /// script-level outcome of the same fragment.
    pub fn run_scripts(
        &mut self,
        fragments: &[String],
        policy: FatalPolicy,
    ) -> Result<(), HostError> {
        for src in fragments {
            let result = self.engine.run_with_scope(&mut self.scope, src);
            if let Some(source) = self.fatal.borrow_mut().take() {
                return Err(HostError::Fatal { source });
            }
            if let Err(err) = result {
                match policy {
                    FatalPolicy::Exit => {
                        eprintln!("FATAL SCRIPT ERROR: {err}");
                        std::process::exit(1);
                    }
                    FatalPolicy::Propagate => {
                        return Err(HostError::Script {
                            why: err.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Tear the engine down and hand the bag back.
    pub fn into_bag(self) -> Result<NvBag, HostError> {
        let ScriptHost {
            engine,
            scope,
            handles,
            token,
            fatal: _,
        } = self;
        drop(scope);
        drop(engine);
        let slot = handles
            .borrow_mut()
            .release(token)
            .ok_or(HostError::Teardown)?;
        Rc::try_unwrap(slot)
            .map(RefCell::into_inner)
            .map_err(|_| HostError::Teardown)
    }
}

fn runtime_err(msg: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(msg),
        Position::NONE,
    ))
}

fn require_int(value: &Dynamic, what: &str) -> Result<INT, Box<EvalAltResult>> {
    value.as_int().map_err(|actual| {
        Box::new(EvalAltResult::ErrorMismatchDataType(
            format!("int {what}"),
            actual.to_string(),
            Position::NONE,
        ))
    })
}

fn require_str(
    value: Dynamic,
    what: &str,
) -> Result<rhai::ImmutableString, Box<EvalAltResult>> {
    value.into_immutable_string().map_err(|actual| {
        Box::new(EvalAltResult::ErrorMismatchDataType(
            format!("string {what}"),
            actual.to_string(),
            Position::NONE,
        ))
    })
}
