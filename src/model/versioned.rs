use std::sync;
use std::sync::atomic;

/// Something that can be applied to an `Object`, producing a record of what
/// it did. The change is handed back so a failed compare-and-swap can retry it.
pub trait Change<Object>: Clone {
    type ApplyError;
    type ApplyRecord: Clone;

    fn apply(self, object: &mut Object) -> Result<(Self, Self::ApplyRecord), Self::ApplyError>;
}

/// Identifies one generation of one versioned object. Generations come from a
/// process-wide counter, so they increase monotonically for every object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Stamp {
    uid: u64,
    generation: u64,
}

static NEXT_UID:        atomic::AtomicU64 = atomic::AtomicU64::new(1);
static NEXT_GENERATION: atomic::AtomicU64 = atomic::AtomicU64::new(1);

pub(crate) fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, atomic::Ordering::Relaxed)
}

pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, atomic::Ordering::Relaxed)
}

impl Default for Stamp {
    fn default() -> Self {
        Stamp::fresh()
    }
}

impl Stamp {
    /// A stamp for a brand new object.
    pub fn fresh() -> Stamp {
        Stamp {
            uid: next_uid(),
            generation: next_generation(),
        }
    }

    /// The next generation of the same object.
    pub fn advance(self) -> Stamp {
        Stamp {
            uid: self.uid,
            generation: next_generation(),
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_outdated(&self, other: &Self) -> bool {
        self.uid != other.uid ||
            self.generation != other.generation
    }
}

/// A stamp that can be read without a lock and advanced by whoever holds the
/// writer's side of the object it describes.
#[derive(Debug)]
pub struct AtomicStamp {
    uid: u64,
    generation: atomic::AtomicU64,
}

impl AtomicStamp {
    pub fn new() -> AtomicStamp {
        let stamp = Stamp::fresh();
        AtomicStamp {
            uid: stamp.uid,
            generation: atomic::AtomicU64::new(stamp.generation),
        }
    }

    pub fn load(&self) -> Stamp {
        Stamp {
            uid: self.uid,
            generation: self.generation.load(atomic::Ordering::Acquire),
        }
    }

    pub fn advance(&self) -> Stamp {
        let generation = next_generation();
        self.generation.store(generation, atomic::Ordering::Release);
        Stamp {
            uid: self.uid,
            generation,
        }
    }
}

impl Default for AtomicStamp {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Versioned: Sized + Clone {
    type Change: Change<Self>;

    fn stamp(&self) -> Stamp;
    fn stamp_mut(&mut self) -> &mut Stamp;

    fn generation(&self) -> u64 {
        self.stamp().generation
    }

    fn is_outdated(&self, other: &Self) -> bool {
        self.stamp().is_outdated(&other.stamp())
    }
}

/// Holds the current version of an object. Readers get cheap snapshots;
/// changes are applied to a copy and swapped in.
pub struct Host<Object: Versioned> {
    current: arc_swap::ArcSwap<Object>,
}

type ApplyResult<Object> = Result<
        (sync::Arc<Object>, <<Object as Versioned>::Change as Change<Object>>::ApplyRecord),
        <<Object as Versioned>::Change as Change<Object>>::ApplyError>;

impl<Object: Versioned> Host<Object> {
    pub fn new(initial: Object) -> Self {
        Host {
            current: arc_swap::ArcSwap::from(sync::Arc::new(initial)),
        }
    }

    pub fn get(&self) -> sync::Arc<Object> {
        self.current.load_full()
    }

    pub fn change(&self, mut change: Object::Change) -> ApplyResult<Object> {
        loop {
            let old = self.current.load();
            let mut object = (**old).clone();
            let (returned, record) = change.apply(&mut object)?;

            let stamp = object.stamp_mut();
            *stamp = stamp.advance();

            let new = sync::Arc::new(object);
            let swapped = self.current.compare_and_swap(&*old, new.clone());

            if sync::Arc::ptr_eq(&*old, &swapped) {
                return Ok((new, record));
            }

            /* another thread got there first; apply again on top of theirs */
            change = returned;
        }
    }
}

impl<Object: Versioned + Default> Default for Host<Object> {
    fn default() -> Self {
        Self::new(Object::default())
    }
}

impl<Object: Versioned> std::fmt::Debug for Host<Object> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(std::any::type_name::<Host<Object>>())
            .field("generation", &self.current.load().generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Counter {
        value: u32,
        stamp: Stamp,
    }

    #[derive(Clone, Debug)]
    struct Add(u32);

    impl Change<Counter> for Add {
        type ApplyError = ();
        type ApplyRecord = u32;

        fn apply(self, object: &mut Counter) -> Result<(Self, u32), ()> {
            let before = object.value;
            object.value = object.value.checked_add(self.0).ok_or(())?;
            Ok((self, before))
        }
    }

    impl Versioned for Counter {
        type Change = Add;

        fn stamp(&self) -> Stamp {
            self.stamp
        }

        fn stamp_mut(&mut self) -> &mut Stamp {
            &mut self.stamp
        }
    }

    #[test]
    fn stamps_advance_monotonically() {
        let a = Stamp::fresh();
        let b = a.advance();
        assert_eq!(a.uid(), b.uid());
        assert!(b.generation() > a.generation());
        assert!(a.is_outdated(&b));
        assert!(!b.is_outdated(&b));

        let other = Stamp::fresh();
        assert_ne!(a.uid(), other.uid());
    }

    #[test]
    fn atomic_stamp_tracks_latest() {
        let stamp = AtomicStamp::new();
        let first = stamp.load();
        let second = stamp.advance();
        assert!(first.is_outdated(&second));
        assert_eq!(stamp.load(), second);
    }

    #[test]
    fn host_change_bumps_generation() {
        let host = Host::new(Counter::default());
        let before = host.get();

        let (after, record) = host.change(Add(3)).unwrap();
        assert_eq!(record, 0);
        assert_eq!(after.value, 3);
        assert!(before.is_outdated(&after));

        assert_eq!(host.change(Add(u32::MAX)).unwrap_err(), ());
        assert_eq!(host.get().value, 3);
    }
}
