//! Benchmark utilities.

use pagesync_protocol::{ItemIndex, PageId};
use pagesync_server::{ServerConfig, ServerSynchronisedData};
use pagesync_testkit::TestUnit;
use rand::Rng;

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate test units with labels of the specified size.
pub fn generate_units(count: u32, label_size: usize) -> Vec<(ItemIndex, TestUnit)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let label: String = (0..label_size)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            (i, TestUnit::new(rng.gen(), label))
        })
        .collect()
}

/// Creates an authority holding `pages` pages of `items` items each.
pub fn populated_authority(pages: PageId, items: u32) -> ServerSynchronisedData<TestUnit> {
    let authority = ServerSynchronisedData::new(ServerConfig::new("bench"));
    for page in 0..pages {
        authority.set_items(page, generate_units(items, 16));
    }
    authority
}
