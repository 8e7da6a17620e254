//! Hero image selection from declarative topic pools.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;

use seoagent_shared::ImagePool;

/// Pick a hero image for `topic`.
///
/// The first pool with a pattern contained in the topic (case-insensitive)
/// supplies its first unused image. When that pool is used up, the first
/// unused image of any pool wins. When every image is used, one is drawn at
/// random from all pools. Returns `None` only when the pools are empty.
pub fn choose_hero_image<R: Rng + ?Sized>(
    pools: &[ImagePool],
    topic: &str,
    used: &HashSet<String>,
    rng: &mut R,
) -> Option<String> {
    let topic = topic.to_lowercase();
    let unused = |pool: &ImagePool| pool.images.iter().find(|img| !used.contains(*img)).cloned();

    let matched = pools.iter().find(|pool| {
        pool.patterns
            .iter()
            .any(|p| !p.is_empty() && topic.contains(&p.to_lowercase()))
    });
    if let Some(image) = matched.and_then(unused) {
        return Some(image);
    }

    if let Some(image) = pools.iter().find_map(unused) {
        return Some(image);
    }

    let all: Vec<&String> = pools.iter().flat_map(|p| &p.images).collect();
    all.choose(rng).map(|img| (*img).clone())
}
