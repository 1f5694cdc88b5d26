// Opaque handle registry.
//
// The host only ever sees a 1x1 uint64 scalar. Its 64 bits are
// (generation << 32) | slot index into this registry, never a raw address;
// decoding a stale, forged, or wrong-kind handle is a typed error, not
// undefined behavior.
//
// A process-wide lock counter mirrors the host's module-unload guard
// (mexLock/mexUnlock semantics): one acquire per live object, one release on
// its delete. A leaked handle pins the count forever; that is intrinsic to
// the calling convention, not a bug.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Value;
use crate::driver::{DomainFunction, ForwardDriver, VolumeWriter};

static MODULE_LOCK: AtomicU64 = AtomicU64::new(0);

/// Number of live native objects pinning the binding module.
pub fn module_lock_count() -> u64 {
    MODULE_LOCK.load(Ordering::SeqCst)
}

fn acquire_module_lock() {
    MODULE_LOCK.fetch_add(1, Ordering::SeqCst);
}

fn release_module_lock() {
    MODULE_LOCK.fetch_sub(1, Ordering::SeqCst);
}

/// A native object owned by the registry on behalf of the host.
pub enum NativeObject {
    Driver(Box<dyn ForwardDriver>),
    Function(Box<dyn DomainFunction>),
    Writer(Box<dyn VolumeWriter>),
}

impl NativeObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeObject::Driver(_) => "driver",
            NativeObject::Function(_) => "function",
            NativeObject::Writer(_) => "writer",
        }
    }
}

struct Slot {
    generation: u32,
    object: Option<NativeObject>,
}

#[derive(Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

fn encode(index: u32, generation: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

fn decode(handle: u64) -> (u32, u32) {
    (handle as u32, (handle >> 32) as u32)
}

/// Read a handle off the wire: it must be exactly a 1x1 uint64 scalar.
pub fn decode_handle(value: &Value) -> Result<u64, Error> {
    let Some(array) = value.as_uint64() else {
        return Err(Error::new(ErrorKind::InvalidHandle)
            .with_message("input must be a real uint64 scalar"));
    };
    match array.scalar() {
        Some(&handle) => Ok(handle),
        None => Err(Error::new(ErrorKind::InvalidHandle)
            .with_message("input must be a real uint64 scalar")),
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects in this registry.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn insert(&mut self, object: NativeObject) -> u64 {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].object = Some(object);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                index
            }
        };
        acquire_module_lock();
        encode(index, self.slots[index as usize].generation)
    }

    fn slot(&self, handle: u64) -> Result<(usize, &Slot), Error> {
        let (index, generation) = decode(handle);
        let slot = self
            .slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation && slot.object.is_some())
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidHandle)
                    .with_message(format!("handle {handle:#x} does not refer to a live object"))
            })?;
        Ok((index as usize, slot))
    }

    pub fn object(&self, handle: u64) -> Result<&NativeObject, Error> {
        let (_, slot) = self.slot(handle)?;
        Ok(slot.object.as_ref().unwrap())
    }

    pub fn object_mut(&mut self, handle: u64) -> Result<&mut NativeObject, Error> {
        let (index, _) = self.slot(handle)?;
        Ok(self.slots[index].object.as_mut().unwrap())
    }

    fn take(&mut self, handle: u64) -> Result<NativeObject, Error> {
        let (index, _) = self.slot(handle)?;
        let slot = &mut self.slots[index];
        let object = slot.object.take().unwrap();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        release_module_lock();
        Ok(object)
    }

    fn wrong_kind(handle: u64, expected: &str, found: &str) -> Error {
        Error::new(ErrorKind::InvalidHandle).with_message(format!(
            "handle {handle:#x} refers to a {found}, expected a {expected}"
        ))
    }

    pub fn driver(&self, handle: u64) -> Result<&dyn ForwardDriver, Error> {
        match self.object(handle)? {
            NativeObject::Driver(driver) => Ok(driver.as_ref()),
            other => Err(Self::wrong_kind(handle, "driver", other.kind_name())),
        }
    }

    pub fn driver_mut(&mut self, handle: u64) -> Result<&mut (dyn ForwardDriver + 'static), Error> {
        match self.object_mut(handle)? {
            NativeObject::Driver(driver) => Ok(driver.as_mut()),
            other => Err(Self::wrong_kind(handle, "driver", other.kind_name())),
        }
    }

    pub fn function(&self, handle: u64) -> Result<&dyn DomainFunction, Error> {
        match self.object(handle)? {
            NativeObject::Function(function) => Ok(function.as_ref()),
            other => Err(Self::wrong_kind(handle, "function", other.kind_name())),
        }
    }

    pub fn writer(&self, handle: u64) -> Result<&dyn VolumeWriter, Error> {
        match self.object(handle)? {
            NativeObject::Writer(writer) => Ok(writer.as_ref()),
            other => Err(Self::wrong_kind(handle, "writer", other.kind_name())),
        }
    }

    /// Remove a driver object, releasing its module lock.
    pub fn remove_driver(&mut self, handle: u64) -> Result<(), Error> {
        self.driver(handle)?;
        self.take(handle).map(drop)
    }

    /// Remove a function object, releasing its module lock.
    pub fn remove_function(&mut self, handle: u64) -> Result<(), Error> {
        self.function(handle)?;
        self.take(handle).map(drop)
    }

    /// Remove a writer object, releasing its module lock.
    pub fn remove_writer(&mut self, handle: u64) -> Result<(), Error> {
        self.writer(handle)?;
        self.take(handle).map(drop)
    }

    fn pair_mut(
        &mut self,
        first: u64,
        second: u64,
    ) -> Result<(&mut NativeObject, &mut NativeObject), Error> {
        let (first_index, _) = self.slot(first)?;
        let (second_index, _) = self.slot(second)?;
        if first_index == second_index {
            return Err(Error::new(ErrorKind::InvalidHandle)
                .with_message("handles must refer to two distinct objects"));
        }
        let (first_slot, second_slot) = if first_index < second_index {
            let (head, tail) = self.slots.split_at_mut(second_index);
            (&mut head[first_index], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(first_index);
            (&mut tail[0], &mut head[second_index])
        };
        Ok((
            first_slot.object.as_mut().unwrap(),
            second_slot.object.as_mut().unwrap(),
        ))
    }

    /// Borrow a driver and a domain function at once, for solves that mutate
    /// the function in place.
    pub fn driver_and_function_mut(
        &mut self,
        driver: u64,
        function: u64,
    ) -> Result<(&mut (dyn ForwardDriver + 'static), &mut (dyn DomainFunction + 'static)), Error>
    {
        let (first, second) = self.pair_mut(driver, function)?;
        match (first, second) {
            (NativeObject::Driver(driver), NativeObject::Function(function)) => {
                Ok((driver.as_mut(), function.as_mut()))
            }
            (first, _) if !matches!(first, NativeObject::Driver(_)) => {
                Err(Self::wrong_kind(driver, "driver", first.kind_name()))
            }
            (_, second) => Err(Self::wrong_kind(function, "function", second.kind_name())),
        }
    }

    /// Borrow a writer and a domain function at once.
    pub fn writer_and_function_mut(
        &mut self,
        writer: u64,
        function: u64,
    ) -> Result<(&mut (dyn VolumeWriter + 'static), &dyn DomainFunction), Error> {
        let (first, second) = self.pair_mut(writer, function)?;
        match (first, second) {
            (NativeObject::Writer(writer), NativeObject::Function(function)) => {
                Ok((writer.as_mut(), &**function))
            }
            (first, _) if !matches!(first, NativeObject::Writer(_)) => {
                Err(Self::wrong_kind(writer, "writer", first.kind_name()))
            }
            (_, second) => Err(Self::wrong_kind(function, "function", second.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::{HandleRegistry, NativeObject, decode_handle, module_lock_count};
    use crate::core::error::ErrorKind;
    use crate::core::value::Value;
    use crate::driver::null::NullFunction;

    // The module lock is process-wide; tests asserting on it serialize here.
    static LOCK_TEST_GUARD: Mutex<()> = Mutex::new(());

    fn function() -> NativeObject {
        NativeObject::Function(Box::new(NullFunction::default()))
    }

    #[test]
    fn handle_round_trips_bit_exact() {
        for handle in [0u64, 1, 0xdead_beef, u64::MAX] {
            let value = Value::uint64_scalar(handle);
            assert_eq!(decode_handle(&value).unwrap(), handle);
        }
    }

    #[test]
    fn handle_must_be_uint64_scalar() {
        for value in [
            Value::scalar(1.0),
            Value::string("7"),
            Value::uint64_matrix(1, 2, vec![1, 2]).unwrap(),
        ] {
            let err = decode_handle(&value).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        }
    }

    #[test]
    fn stale_handle_is_rejected_after_removal() {
        let _guard = LOCK_TEST_GUARD.lock().unwrap();
        let mut registry = HandleRegistry::new();
        let handle = registry.insert(function());
        registry.remove_function(handle).unwrap();

        let err = registry.function(handle).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);

        // The slot is reused with a bumped generation; the old handle stays dead.
        let replacement = registry.insert(function());
        assert_ne!(replacement, handle);
        assert!(registry.function(handle).is_err());
        assert!(registry.function(replacement).is_ok());
        registry.remove_function(replacement).unwrap();
    }

    #[test]
    fn wrong_kind_handle_is_rejected() {
        let _guard = LOCK_TEST_GUARD.lock().unwrap();
        let mut registry = HandleRegistry::new();
        let handle = registry.insert(function());
        let err = registry.driver(handle).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        assert!(err.to_string().contains("expected a driver"));
        registry.remove_function(handle).unwrap();
    }

    #[test]
    fn forged_handle_is_rejected() {
        let registry = HandleRegistry::new();
        let err = registry.object(0x1234_5678_9abc_def0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn module_lock_pairs_with_object_lifetime() {
        let _guard = LOCK_TEST_GUARD.lock().unwrap();
        let baseline = module_lock_count();
        let mut registry = HandleRegistry::new();
        let a = registry.insert(function());
        let b = registry.insert(function());
        assert_eq!(module_lock_count(), baseline + 2);
        assert_eq!(registry.live(), 2);

        registry.remove_function(a).unwrap();
        assert_eq!(module_lock_count(), baseline + 1);
        registry.remove_function(b).unwrap();
        assert_eq!(module_lock_count(), baseline);
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn failed_removal_does_not_release_lock() {
        let _guard = LOCK_TEST_GUARD.lock().unwrap();
        let baseline = module_lock_count();
        let mut registry = HandleRegistry::new();
        let handle = registry.insert(function());
        assert!(registry.remove_driver(handle).is_err());
        assert_eq!(module_lock_count(), baseline + 1);
        registry.remove_function(handle).unwrap();
        assert_eq!(module_lock_count(), baseline);
    }
}
