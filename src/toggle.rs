use std::{fmt, marker::PhantomData, sync::Arc};

use crate::record::ToggleRecord;

type PredicateFn<T> = dyn Fn(&T, Option<&str>) -> bool + Send + Sync;

enum Predicate<T> {
    Constant(bool),
    Record(Arc<ToggleRecord>),
    Custom(Arc<PredicateFn<T>>),
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Constant(value) => Predicate::Constant(*value),
            Predicate::Record(record) => Predicate::Record(Arc::clone(record)),
            Predicate::Custom(f) => Predicate::Custom(Arc::clone(f)),
        }
    }
}

/// A reusable, cohort-aware boolean predicate over inputs of type `T`.
///
/// Toggles are immutable and cheap to clone. [`Toggle::with_cohort`] returns a new toggle with
/// the cohort bound; the original is left unchanged.
///
/// # Examples
///
/// ```
/// # use toggle::{Filter, Toggle, ToggleRecord, Weight};
/// let record = ToggleRecord::new("/feature/admin_widget", Weight::NEVER)
///     .with_filter(Filter::cohort("admin", Weight::ALWAYS));
/// let toggle: Toggle<u32> = Toggle::from_record(record);
///
/// assert!(!toggle.evaluate(&1));
/// assert!(toggle.evaluate_with_cohort(&1, Some("admin")));
/// assert!(toggle.with_cohort("admin").evaluate(&1));
/// ```
pub struct Toggle<T> {
    predicate: Predicate<T>,
    cohort: Option<Arc<str>>,
    // `fn(&T)` keeps `Toggle<T>` `Send + Sync` regardless of `T`.
    _input: PhantomData<fn(&T)>,
}

impl<T> Toggle<T> {
    fn new(predicate: Predicate<T>) -> Toggle<T> {
        Toggle {
            predicate,
            cohort: None,
            _input: PhantomData,
        }
    }

    /// A toggle that is on for every input and cohort.
    pub fn always_true() -> Toggle<T> {
        Toggle::new(Predicate::Constant(true))
    }

    /// A toggle that is off for every input and cohort.
    pub fn always_false() -> Toggle<T> {
        Toggle::new(Predicate::Constant(false))
    }

    /// A toggle evaluated by drawing against the weights of `record`.
    pub fn from_record(record: impl Into<Arc<ToggleRecord>>) -> Toggle<T> {
        Toggle::new(Predicate::Record(record.into()))
    }

    /// A toggle backed by an arbitrary predicate. `f` receives the input and the cohort in
    /// effect for the evaluation.
    pub fn from_fn<F>(f: F) -> Toggle<T>
    where
        F: Fn(&T, Option<&str>) -> bool + Send + Sync + 'static,
    {
        Toggle::new(Predicate::Custom(Arc::new(f)))
    }

    /// Returns a toggle that evaluates as if `cohort` was supplied whenever [`Toggle::evaluate`]
    /// is called.
    ///
    /// [`Toggle::evaluate_with_cohort`] keeps using its explicit argument.
    pub fn with_cohort(&self, cohort: impl Into<Arc<str>>) -> Toggle<T> {
        Toggle {
            predicate: self.predicate.clone(),
            cohort: Some(cohort.into()),
            _input: PhantomData,
        }
    }

    /// Cohort bound with [`Toggle::with_cohort`], if any.
    pub fn cohort(&self) -> Option<&str> {
        self.cohort.as_deref()
    }

    /// The record this toggle draws against, if it was built from one.
    pub fn record(&self) -> Option<&ToggleRecord> {
        match &self.predicate {
            Predicate::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }

    /// Evaluate the toggle for `input` using the bound cohort.
    pub fn evaluate(&self, input: &T) -> bool {
        self.evaluate_with_cohort(input, self.cohort())
    }

    /// Evaluate the toggle for `input` with an explicit `cohort`, ignoring any bound cohort.
    pub fn evaluate_with_cohort(&self, input: &T, cohort: Option<&str>) -> bool {
        match &self.predicate {
            Predicate::Constant(value) => *value,
            Predicate::Record(record) => record.evaluate(cohort),
            Predicate::Custom(f) => f(input, cohort),
        }
    }
}

impl<T> Clone for Toggle<T> {
    fn clone(&self) -> Self {
        Toggle {
            predicate: self.predicate.clone(),
            cohort: self.cohort.clone(),
            _input: PhantomData,
        }
    }
}

impl<T> From<ToggleRecord> for Toggle<T> {
    fn from(record: ToggleRecord) -> Toggle<T> {
        Toggle::from_record(record)
    }
}

impl<T> fmt::Debug for Toggle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Toggle");
        match &self.predicate {
            Predicate::Constant(value) => s.field("constant", value),
            Predicate::Record(record) => s.field("record", record),
            Predicate::Custom(_) => s.field("custom", &".."),
        };
        s.field("cohort", &self.cohort).finish()
    }
}
