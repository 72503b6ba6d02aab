use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// CAPABILITY TRAITS
// ================================================================================================
//
// Deferred pattern payloads do not hold values, they hold capabilities: something that can
// produce a value when the node is visited (getters), or accept one when a match effect fires
// (setters). A payload keeps its capability behind an `Arc`, so the caller-lifetime rules of
// raw-pointer designs do not apply; dropping the pattern drops its share of the capability.

/// Produces a boolean at match time; a deferred predicate pattern fails when `get` returns false.
pub trait BoolGetter: Send + Sync {
    fn get(&self) -> bool;
}

/// Produces a natural number at match time, for the deferred forms of `pos`, `rpos`, `tab`,
/// `rtab` and `len`.
pub trait NatGetter: Send + Sync {
    fn get(&self) -> usize;
}

/// Accepts a cursor position, for the setter form of `setcur`.
pub trait NatSetter: Send + Sync {
    fn set(&self, value: usize);
}

/// Produces a string at match time, for the deferred string forms of the character-test
/// constructors and of string patterns.
///
/// The return type is `Cow` so a getter that holds its value can hand out a borrowed view while
/// a computing getter may allocate.
pub trait StringGetter: Send + Sync {
    fn get(&self) -> Cow<'_, str>;
}

/// Accepts a matched substring, for the call forms of the assignment combinators.
pub trait StringSetter: Send + Sync {
    fn set(&self, value: &str);
}

impl<F> BoolGetter for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn get(&self) -> bool {
        self()
    }
}

impl<F> NatGetter for F
where
    F: Fn() -> usize + Send + Sync,
{
    fn get(&self) -> usize {
        self()
    }
}

impl<F> NatSetter for F
where
    F: Fn(usize) + Send + Sync,
{
    fn set(&self, value: usize) {
        self(value)
    }
}

impl<F> StringGetter for F
where
    F: Fn() -> String + Send + Sync,
{
    fn get(&self) -> Cow<'_, str> {
        Cow::Owned(self())
    }
}

impl<F> StringSetter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn set(&self, value: &str) {
        self(value)
    }
}

// SHARED VARIABLES
// ================================================================================================

/// A shared string variable.
///
/// Cloning shares the cell: a clone held inside a pattern and a clone held by the caller observe
/// the same value, which is what the variable forms of the constructors (read at match time) and
/// the assignment combinators (written at match time) rely on.
#[derive(Clone, Default)]
pub struct StrVar(Arc<Mutex<String>>);

impl StrVar {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(value.into())))
    }

    /// Returns the current value.
    pub fn get(&self) -> String {
        self.lock().clone()
    }

    /// Replaces the current value.
    pub fn set(&self, value: impl Into<String>) {
        *self.lock() = value.into();
    }

    /// Identity of the underlying cell, used by the pattern printers.
    pub fn id(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StringGetter for StrVar {
    fn get(&self) -> Cow<'_, str> {
        Cow::Owned(self.get())
    }
}

impl StringSetter for StrVar {
    fn set(&self, value: &str) {
        self.set(value);
    }
}

impl fmt::Debug for StrVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrVar({:?})", self.get())
    }
}

/// A shared natural-number variable, the target of `setcur` and the source of the variable forms
/// of the position constructors.
#[derive(Clone, Default)]
pub struct NatVar(Arc<AtomicUsize>);

impl NatVar {
    pub fn new(value: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(value)))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: usize) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Identity of the underlying cell, used by the pattern printers.
    pub fn id(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl NatGetter for NatVar {
    fn get(&self) -> usize {
        self.get()
    }
}

impl NatSetter for NatVar {
    fn set(&self, value: usize) {
        self.set(value);
    }
}

impl fmt::Debug for NatVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NatVar({})", self.get())
    }
}

/// String setter that writes each value to standard output on its own line.
#[derive(Clone, Copy, Debug, Default)]
pub struct Output;

impl StringSetter for Output {
    fn set(&self, value: &str) {
        println!("{value}");
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_var_is_shared() {
        let var = StrVar::default();
        let alias = var.clone();
        alias.set("hello");
        assert_eq!(var.get(), "hello");
        assert_eq!(var.id(), alias.id());
    }

    #[test]
    fn nat_var_is_shared() {
        let var = NatVar::new(3);
        let alias = var.clone();
        alias.set(7);
        assert_eq!(var.get(), 7);
    }

    #[test]
    fn closures_are_capabilities() {
        fn take_bool(g: &dyn BoolGetter) -> bool {
            g.get()
        }
        fn take_str(g: &dyn StringGetter) -> String {
            g.get().into_owned()
        }

        assert!(take_bool(&|| true));
        assert_eq!(take_str(&|| "ab".to_string()), "ab");
    }
}
