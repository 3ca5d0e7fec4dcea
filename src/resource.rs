//! Shared capture/inference resources
//!
//! Heavy collaborators such as a landmark model are created once and reused
//! across lab sessions. Instead of a module-level global, the session holds an
//! explicit [`ResourceLease`] obtained from [`SharedResource::acquire`] and
//! passes the handle into its frame processing. The resource is torn down when
//! the last lease is released.

use crate::error::LabError;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

type Factory<T> = Box<dyn Fn() -> Result<T, LabError>>;

struct Slot<T> {
    value: Option<Rc<T>>,
    leases: usize,
}

/// Lazily initialized, reference-counted resource
pub struct SharedResource<T> {
    name: String,
    factory: Factory<T>,
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> SharedResource<T> {
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Result<T, LabError> + 'static,
    {
        Self {
            name: name.to_string(),
            factory: Box::new(factory),
            slot: Rc::new(RefCell::new(Slot {
                value: None,
                leases: 0,
            })),
        }
    }

    /// Obtain a lease, initializing the resource on first use.
    ///
    /// A failed initialization leaves nothing allocated; the next acquire
    /// retries the factory.
    pub fn acquire(&self) -> Result<ResourceLease<T>, LabError> {
        let mut slot = self.slot.borrow_mut();
        let existing = slot.value.clone();
        let value = match existing {
            Some(value) => value,
            None => {
                let value = Rc::new((self.factory)()?);
                info!(resource = %self.name, "resource initialized");
                slot.value = Some(Rc::clone(&value));
                value
            }
        };
        slot.leases += 1;
        debug!(resource = %self.name, leases = slot.leases, "resource acquired");

        Ok(ResourceLease {
            value,
            slot: Rc::clone(&self.slot),
            name: self.name.clone(),
        })
    }

    pub fn lease_count(&self) -> usize {
        self.slot.borrow().leases
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.borrow().value.is_some()
    }
}

/// An active hold on a [`SharedResource`]; releases on drop
pub struct ResourceLease<T> {
    value: Rc<T>,
    slot: Rc<RefCell<Slot<T>>>,
    name: String,
}

impl<T> ResourceLease<T> {
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Release explicitly; equivalent to dropping the lease
    pub fn release(self) {}
}

impl<T> Drop for ResourceLease<T> {
    fn drop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        slot.leases = slot.leases.saturating_sub(1);
        if slot.leases == 0 && slot.value.take().is_some() {
            info!(resource = %self.name, "resource released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_single_initialization_across_leases() {
        let created = Rc::new(Cell::new(0));
        let counter = Rc::clone(&created);
        let resource = SharedResource::new("landmarks", move || {
            counter.set(counter.get() + 1);
            Ok(42u32)
        });

        let a = resource.acquire().unwrap();
        let b = resource.acquire().unwrap();

        assert_eq!(*a.get() + *b.get(), 84);
        assert_eq!(created.get(), 1);
        assert_eq!(resource.lease_count(), 2);
    }

    #[test]
    fn test_release_tears_down_after_last_lease() {
        let resource = SharedResource::new("landmarks", || Ok(String::from("model")));

        let a = resource.acquire().unwrap();
        let b = resource.acquire().unwrap();
        a.release();
        assert!(resource.is_initialized());

        drop(b);
        assert!(!resource.is_initialized());
        assert_eq!(resource.lease_count(), 0);
    }

    #[test]
    fn test_failed_init_is_retried() {
        let attempts = Rc::new(Cell::new(0));
        let counter = Rc::clone(&attempts);
        let resource = SharedResource::new("landmarks", move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(LabError::BackendInit("no gpu".to_string()))
            } else {
                Ok(1u8)
            }
        });

        let err = resource.acquire().err().unwrap();
        assert!(err.is_capture_failure());
        assert_eq!(resource.lease_count(), 0);

        assert!(resource.acquire().is_ok());
        assert_eq!(attempts.get(), 2);
    }
}
