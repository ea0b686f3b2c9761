//! ## Storage
//!
//! A [DynamicStorage] hosts a variable number of small scene objects (lights for instance) in a GPU visible array.
//! Objects are allocated into slots of an append-only [SlotTable] and erased again by their [StorageHandle].
//! Both can happen concurrently from any thread, claiming and releasing a slot is a compare-and-swap on that slot.
//!
//! The storage buffer is sparse. Its memory is grown by the [GrowthCoalescer], which turns any number of size changes
//! between two updates into a single sparse bind command.
//!
//! Some object kinds have a much lower limit than the storage itself (only a few directional lights can cast cascaded
//! shadows per frame). Those limits are modelled by a [BoundedPool] whose slots are linked to the object's handle.

mod bounded;
pub use bounded::{BoundedPool, PoolReservation};

mod coalescer;
pub use coalescer::GrowthCoalescer;

mod dynamic;
pub use dynamic::{DynamicStorage, StorageConfig, StorageHandle, StoredResource};

mod slot_table;
pub use slot_table::{SlotTable, StorageKey};
