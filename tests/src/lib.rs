mod basic;
mod concurrency;
mod persistence;
mod rehash_stress;
mod typed_map;
