use ems_domain::TypeId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed used when the caller doesn't pick one, so repeated scans look at the same items.
pub const DEFAULT_SAMPLE_SEED: u64 = 23;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSample {
    pub primary: Vec<TypeId>,
    /// Catalog entries left out of `primary`, in draw order.
    pub overflow: Vec<TypeId>,
}

/// Draws `sample_size` items from `catalog`. A size of 0, or one that covers the whole catalog,
/// takes every item in catalog order. The same seed and catalog always yield the same sample.
pub fn sample_items(catalog: &[TypeId], sample_size: usize, seed: u64) -> ItemSample {
    if sample_size == 0 || sample_size >= catalog.len() {
        return ItemSample {
            primary: catalog.to_vec(),
            overflow: vec![],
        };
    }

    let mut shuffled = catalog.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    let overflow = shuffled.split_off(sample_size);
    ItemSample {
        primary: shuffled,
        overflow,
    }
}
