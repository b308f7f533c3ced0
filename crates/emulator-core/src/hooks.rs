//! Hook registry: eleven interception points around fetch, decode, execute,
//! memory access and register access.
//!
//! Every registration is either a plain function pointer, which receives the
//! optional user-data value stored alongside it, or a boxed closure carrying
//! its own captured state. Hooks of one kind run in registration order.
//!
//! Removing hooks while [`Emulator::emulate`] is running is deferred: the ids
//! land in a pending set that dispatch skips, and the tables are swept
//! between pipeline steps and when the run returns.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;

use tracing::debug;

use crate::decoder::Instruction;
use crate::{Emulator, Register};

/// User data handed to function-pointer hooks.
pub type UserData<'a> = Option<&'a mut (dyn Any + 'static)>;

/// Before-fetch hook: `(emulator, address, size, user_data)`.
pub type FetchHookFn = fn(&mut Emulator, u32, u32, UserData<'_>);
/// Closure form of [`FetchHookFn`].
pub type FetchHookClosure = dyn FnMut(&mut Emulator, u32, u32);

/// Instruction hook (decoded or executed): `(emulator, instruction, user_data)`.
pub type InstructionHookFn = fn(&mut Emulator, &Instruction, UserData<'_>);
/// Closure form of [`InstructionHookFn`].
pub type InstructionHookClosure = dyn FnMut(&mut Emulator, &Instruction);

/// Memory hook: `(emulator, address, width, value, user_data)`.
pub type MemoryHookFn = fn(&mut Emulator, u32, u8, u32, UserData<'_>);
/// Closure form of [`MemoryHookFn`].
pub type MemoryHookClosure = dyn FnMut(&mut Emulator, u32, u8, u32);

/// Register hook: `(emulator, register, value, user_data)`.
pub type RegisterHookFn = fn(&mut Emulator, Register, u32, UserData<'_>);
/// Closure form of [`RegisterHookFn`].
pub type RegisterHookClosure = dyn FnMut(&mut Emulator, Register, u32);

/// Stateless function or closure with captured state.
pub enum HookCallback<P, C: ?Sized> {
    /// Plain function pointer.
    Function(P),
    /// Boxed closure.
    Closure(Box<C>),
}

impl<P, C: ?Sized> fmt::Debug for HookCallback<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::Closure(_) => f.write_str("Closure"),
        }
    }
}

/// Identifier returned by every `add_*` call. Never zero, never reused.
///
/// Ids are drawn from a 64-bit counter; registering a hook after all
/// `u64::MAX` ids have been handed out panics instead of reusing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(NonZeroU64);

impl HookId {
    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

/// Interception point a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before an instruction is fetched.
    BeforeFetch,
    /// After an instruction is decoded, executed or not.
    InstructionDecoded,
    /// After an instruction whose condition passed has executed.
    InstructionExecuted,
    /// Before a data read from memory.
    MemoryBeforeRead,
    /// After a data read from memory.
    MemoryAfterRead,
    /// Before a data write to memory.
    MemoryBeforeWrite,
    /// After a data write to memory.
    MemoryAfterWrite,
    /// Before a core register is read.
    RegisterBeforeRead,
    /// After a core register is read.
    RegisterAfterRead,
    /// Before a core register is written.
    RegisterBeforeWrite,
    /// After a core register is written.
    RegisterAfterWrite,
}

impl HookKind {
    /// Number of kinds.
    pub const COUNT: usize = 11;

    /// Every kind, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::BeforeFetch,
        Self::InstructionDecoded,
        Self::InstructionExecuted,
        Self::MemoryBeforeRead,
        Self::MemoryAfterRead,
        Self::MemoryBeforeWrite,
        Self::MemoryAfterWrite,
        Self::RegisterBeforeRead,
        Self::RegisterAfterRead,
        Self::RegisterBeforeWrite,
        Self::RegisterAfterWrite,
    ];

    /// Position in [`HookKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Position within the kind's callback family.
    const fn slot(self) -> usize {
        match self {
            Self::BeforeFetch
            | Self::InstructionDecoded
            | Self::MemoryBeforeRead
            | Self::RegisterBeforeRead => 0,
            Self::InstructionExecuted | Self::MemoryAfterRead | Self::RegisterAfterRead => 1,
            Self::MemoryBeforeWrite | Self::RegisterBeforeWrite => 2,
            Self::MemoryAfterWrite | Self::RegisterAfterWrite => 3,
        }
    }
}

struct Registration<P, C: ?Sized> {
    callback: HookCallback<P, C>,
    user_data: Option<Box<dyn Any>>,
}

type Shared<P, C> = Rc<RefCell<Registration<P, C>>>;

struct HookTable<P, C: ?Sized> {
    entries: Vec<(HookId, Shared<P, C>)>,
}

impl<P, C: ?Sized> Default for HookTable<P, C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P, C: ?Sized> HookTable<P, C> {
    fn push(&mut self, id: HookId, registration: Registration<P, C>) {
        self.entries
            .push((id, Rc::new(RefCell::new(registration))));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: HookId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    fn remove(&mut self, id: HookId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn retain_live(&mut self, pending: &HashSet<HookId>) {
        self.entries.retain(|(id, _)| !pending.contains(id));
    }

    fn ids(&self) -> impl Iterator<Item = HookId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Registration at `index` unless it is pending removal.
    fn live(&self, index: usize, pending: &HashSet<HookId>) -> Option<Shared<P, C>> {
        let (id, registration) = self.entries.get(index)?;
        if pending.contains(id) {
            return None;
        }
        Some(Rc::clone(registration))
    }
}

type FetchTable = HookTable<FetchHookFn, FetchHookClosure>;
type InstructionTable = HookTable<InstructionHookFn, InstructionHookClosure>;
type MemoryTable = HookTable<MemoryHookFn, MemoryHookClosure>;
type RegisterTable = HookTable<RegisterHookFn, RegisterHookClosure>;

/// Per-emulator hook tables plus deferred-removal bookkeeping.
pub(crate) struct HookRegistry {
    fetch: FetchTable,
    instruction: [InstructionTable; 2],
    memory: [MemoryTable; 4],
    register: [RegisterTable; 4],
    pending: HashSet<HookId>,
    has: [bool; HookKind::COUNT],
    cleanup_requested: bool,
    next: Option<NonZeroU64>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self {
            fetch: HookTable::default(),
            instruction: Default::default(),
            memory: Default::default(),
            register: Default::default(),
            pending: HashSet::new(),
            has: [false; HookKind::COUNT],
            cleanup_requested: false,
            next: Some(NonZeroU64::MIN),
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = HookKind::ALL.iter().map(|&kind| self.count(kind)).collect();
        f.debug_struct("HookRegistry")
            .field("counts", &counts)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl HookRegistry {
    fn allocate(&mut self) -> HookId {
        let Some(id) = self.next else {
            panic!("hook id space exhausted");
        };
        self.next = id.checked_add(1);
        HookId(id)
    }

    fn count(&self, kind: HookKind) -> usize {
        match kind {
            HookKind::BeforeFetch => self.fetch.len(),
            HookKind::InstructionDecoded | HookKind::InstructionExecuted => {
                self.instruction[kind.slot()].len()
            }
            HookKind::MemoryBeforeRead
            | HookKind::MemoryAfterRead
            | HookKind::MemoryBeforeWrite
            | HookKind::MemoryAfterWrite => self.memory[kind.slot()].len(),
            HookKind::RegisterBeforeRead
            | HookKind::RegisterAfterRead
            | HookKind::RegisterBeforeWrite
            | HookKind::RegisterAfterWrite => self.register[kind.slot()].len(),
        }
    }

    fn refresh(&mut self) {
        for kind in HookKind::ALL {
            self.has[kind.index()] = self.count(kind) != 0;
        }
    }

    /// Fast-path check used by the pipeline before traversing a table.
    pub(crate) const fn has(&self, kind: HookKind) -> bool {
        self.has[kind.index()]
    }

    pub(crate) const fn cleanup_requested(&self) -> bool {
        self.cleanup_requested
    }

    fn is_registered(&self, id: HookId) -> bool {
        self.fetch.contains(id)
            || self.instruction.iter().any(|table| table.contains(id))
            || self.memory.iter().any(|table| table.contains(id))
            || self.register.iter().any(|table| table.contains(id))
    }

    /// Removes `id` now, or marks it for the next sweep when `deferred`.
    fn remove(&mut self, id: HookId, deferred: bool) -> bool {
        if deferred {
            if !self.is_registered(id) || !self.pending.insert(id) {
                return false;
            }
            self.cleanup_requested = true;
            return true;
        }

        let removed = self.fetch.remove(id)
            || self.instruction.iter_mut().any(|table| table.remove(id))
            || self.memory.iter_mut().any(|table| table.remove(id))
            || self.register.iter_mut().any(|table| table.remove(id));
        self.refresh();
        removed
    }

    fn clear(&mut self, deferred: bool) {
        if deferred {
            let mut ids: Vec<HookId> = self.fetch.ids().collect();
            ids.extend(self.instruction.iter().flat_map(HookTable::ids));
            ids.extend(self.memory.iter().flat_map(HookTable::ids));
            ids.extend(self.register.iter().flat_map(HookTable::ids));
            self.pending.extend(ids);
            self.cleanup_requested = true;
            return;
        }

        self.fetch = HookTable::default();
        self.instruction = Default::default();
        self.memory = Default::default();
        self.register = Default::default();
        self.pending.clear();
        self.cleanup_requested = false;
        self.refresh();
    }

    /// Applies deferred removals.
    pub(crate) fn sweep(&mut self) {
        if !self.pending.is_empty() {
            self.fetch.retain_live(&self.pending);
            for table in &mut self.instruction {
                table.retain_live(&self.pending);
            }
            for table in &mut self.memory {
                table.retain_live(&self.pending);
            }
            for table in &mut self.register {
                table.retain_live(&self.pending);
            }
            self.pending.clear();
        }
        self.cleanup_requested = false;
        self.refresh();
    }
}

macro_rules! add_hook_pair {
    (
        $(#[$fn_doc:meta])* $fn_name:ident,
        $(#[$closure_doc:meta])* $closure_name:ident,
        $kind:expr, $family:ident, $callback:ty, ($($arg:ty),*)
    ) => {
        $(#[$fn_doc])*
        pub fn $fn_name(&mut self, hook: $callback, user_data: Option<Box<dyn Any>>) -> HookId {
            self.register_hook($kind, |registry, id| {
                registry.$family(id, $kind, Registration {
                    callback: HookCallback::Function(hook),
                    user_data,
                });
            })
        }

        $(#[$closure_doc])*
        pub fn $closure_name<F>(&mut self, hook: F) -> HookId
        where
            F: FnMut(&mut Emulator, $($arg),*) + 'static,
        {
            self.register_hook($kind, |registry, id| {
                registry.$family(id, $kind, Registration {
                    callback: HookCallback::Closure(Box::new(hook)),
                    user_data: None,
                });
            })
        }
    };
}

impl HookRegistry {
    fn push_fetch(
        &mut self,
        id: HookId,
        _kind: HookKind,
        registration: Registration<FetchHookFn, FetchHookClosure>,
    ) {
        self.fetch.push(id, registration);
    }

    fn push_instruction(
        &mut self,
        id: HookId,
        kind: HookKind,
        registration: Registration<InstructionHookFn, InstructionHookClosure>,
    ) {
        self.instruction[kind.slot()].push(id, registration);
    }

    fn push_memory(
        &mut self,
        id: HookId,
        kind: HookKind,
        registration: Registration<MemoryHookFn, MemoryHookClosure>,
    ) {
        self.memory[kind.slot()].push(id, registration);
    }

    fn push_register(
        &mut self,
        id: HookId,
        kind: HookKind,
        registration: Registration<RegisterHookFn, RegisterHookClosure>,
    ) {
        self.register[kind.slot()].push(id, registration);
    }
}

impl Emulator {
    fn register_hook(
        &mut self,
        kind: HookKind,
        insert: impl FnOnce(&mut HookRegistry, HookId),
    ) -> HookId {
        let id = self.hooks.allocate();
        insert(&mut self.hooks, id);
        self.hooks.refresh();
        debug!(id = id.get(), ?kind, "hook added");
        id
    }

    add_hook_pair!(
        /// Registers a function called before each instruction fetch.
        add_before_fetch_hook,
        /// Registers a closure called before each instruction fetch.
        add_before_fetch_closure,
        HookKind::BeforeFetch, push_fetch, FetchHookFn, (u32, u32)
    );

    add_hook_pair!(
        /// Registers a function called after every decode, including skipped instructions.
        add_instruction_decoded_hook,
        /// Registers a closure called after every decode, including skipped instructions.
        add_instruction_decoded_closure,
        HookKind::InstructionDecoded, push_instruction, InstructionHookFn, (&Instruction)
    );

    add_hook_pair!(
        /// Registers a function called after an instruction executes.
        add_instruction_executed_hook,
        /// Registers a closure called after an instruction executes.
        add_instruction_executed_closure,
        HookKind::InstructionExecuted, push_instruction, InstructionHookFn, (&Instruction)
    );

    add_hook_pair!(
        /// Registers a function called before a data read with the current content.
        add_memory_before_read_hook,
        /// Registers a closure called before a data read with the current content.
        add_memory_before_read_closure,
        HookKind::MemoryBeforeRead, push_memory, MemoryHookFn, (u32, u8, u32)
    );

    add_hook_pair!(
        /// Registers a function called after a data read with the value read.
        add_memory_after_read_hook,
        /// Registers a closure called after a data read with the value read.
        add_memory_after_read_closure,
        HookKind::MemoryAfterRead, push_memory, MemoryHookFn, (u32, u8, u32)
    );

    add_hook_pair!(
        /// Registers a function called before a data write with the value to be written.
        add_memory_before_write_hook,
        /// Registers a closure called before a data write with the value to be written.
        add_memory_before_write_closure,
        HookKind::MemoryBeforeWrite, push_memory, MemoryHookFn, (u32, u8, u32)
    );

    add_hook_pair!(
        /// Registers a function called after a data write.
        add_memory_after_write_hook,
        /// Registers a closure called after a data write.
        add_memory_after_write_closure,
        HookKind::MemoryAfterWrite, push_memory, MemoryHookFn, (u32, u8, u32)
    );

    add_hook_pair!(
        /// Registers a function called before a register read with the stored value.
        add_register_before_read_hook,
        /// Registers a closure called before a register read with the stored value.
        add_register_before_read_closure,
        HookKind::RegisterBeforeRead, push_register, RegisterHookFn, (Register, u32)
    );

    add_hook_pair!(
        /// Registers a function called after a register read with the value returned.
        add_register_after_read_hook,
        /// Registers a closure called after a register read with the value returned.
        add_register_after_read_closure,
        HookKind::RegisterAfterRead, push_register, RegisterHookFn, (Register, u32)
    );

    add_hook_pair!(
        /// Registers a function called before a register write.
        add_register_before_write_hook,
        /// Registers a closure called before a register write.
        add_register_before_write_closure,
        HookKind::RegisterBeforeWrite, push_register, RegisterHookFn, (Register, u32)
    );

    add_hook_pair!(
        /// Registers a function called after a register write.
        add_register_after_write_hook,
        /// Registers a closure called after a register write.
        add_register_after_write_closure,
        HookKind::RegisterAfterWrite, push_register, RegisterHookFn, (Register, u32)
    );

    /// Removes one registration.
    ///
    /// Returns `false` when `id` is unknown or already removed. While
    /// [`Emulator::emulate`] is running the removal takes effect at the next
    /// step boundary; the hook is not called again in the meantime.
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let removed = self.hooks.remove(id, self.in_emulate);
        if removed {
            debug!(id = id.get(), deferred = self.in_emulate, "hook removed");
        }
        removed
    }

    /// Removes every registration, deferred while running like [`Emulator::remove_hook`].
    pub fn clear_hooks(&mut self) {
        self.hooks.clear(self.in_emulate);
        debug!(deferred = self.in_emulate, "hooks cleared");
    }

    pub(crate) fn fire_fetch_hooks(&mut self, address: u32, size: u32) {
        if !self.hooks.has(HookKind::BeforeFetch) {
            return;
        }
        let len = self.hooks.fetch.len();
        for index in 0..len {
            let Some(entry) = self.hooks.fetch.live(index, &self.hooks.pending) else {
                continue;
            };
            let Ok(mut registration) = entry.try_borrow_mut() else {
                continue;
            };
            let Registration {
                callback,
                user_data,
            } = &mut *registration;
            match callback {
                HookCallback::Function(hook) => hook(self, address, size, user_data.as_deref_mut()),
                HookCallback::Closure(hook) => hook(self, address, size),
            }
        }
    }

    pub(crate) fn fire_instruction_hooks(&mut self, kind: HookKind, instr: &Instruction) {
        if !self.hooks.has(kind) {
            return;
        }
        let slot = kind.slot();
        let len = self.hooks.instruction[slot].len();
        for index in 0..len {
            let Some(entry) = self.hooks.instruction[slot].live(index, &self.hooks.pending) else {
                continue;
            };
            let Ok(mut registration) = entry.try_borrow_mut() else {
                continue;
            };
            let Registration {
                callback,
                user_data,
            } = &mut *registration;
            match callback {
                HookCallback::Function(hook) => hook(self, instr, user_data.as_deref_mut()),
                HookCallback::Closure(hook) => hook(self, instr),
            }
        }
    }

    pub(crate) fn fire_memory_hooks(&mut self, kind: HookKind, address: u32, width: u8, value: u32) {
        if !self.hooks.has(kind) {
            return;
        }
        let slot = kind.slot();
        let len = self.hooks.memory[slot].len();
        for index in 0..len {
            let Some(entry) = self.hooks.memory[slot].live(index, &self.hooks.pending) else {
                continue;
            };
            let Ok(mut registration) = entry.try_borrow_mut() else {
                continue;
            };
            let Registration {
                callback,
                user_data,
            } = &mut *registration;
            match callback {
                HookCallback::Function(hook) => {
                    hook(self, address, width, value, user_data.as_deref_mut());
                }
                HookCallback::Closure(hook) => hook(self, address, width, value),
            }
        }
    }

    pub(crate) fn fire_register_hooks(&mut self, kind: HookKind, reg: Register, value: u32) {
        if !self.hooks.has(kind) {
            return;
        }
        let slot = kind.slot();
        let len = self.hooks.register[slot].len();
        for index in 0..len {
            let Some(entry) = self.hooks.register[slot].live(index, &self.hooks.pending) else {
                continue;
            };
            let Ok(mut registration) = entry.try_borrow_mut() else {
                continue;
            };
            let Registration {
                callback,
                user_data,
            } = &mut *registration;
            match callback {
                HookCallback::Function(hook) => hook(self, reg, value, user_data.as_deref_mut()),
                HookCallback::Closure(hook) => hook(self, reg, value),
            }
        }
    }
}
