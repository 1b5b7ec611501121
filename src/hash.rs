//! The hasher component: a 64-bit, non-cryptographic hash that is stable across
//! process runs. This is MurmurHash3 x64-128, truncated to its first 64-bit lane, seeded with a
//! fixed constant rather than a per-process random seed — unlike `RandomState`/`fxhash`, nothing
//! here varies between runs, which is required for a hash that is also persisted on disk and
//! re-derived on reopen.

const SEED: u64 = 0x5be5_0d35_dd25_f8a1;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline(always)]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Hash an opaque byte string to a 64-bit value.
///
/// Implements the MurmurHash3 x64-128 mixing rounds and returns the low 64 bits of the 128-bit
/// digest (`h1`), which carries the full entropy of the input the way the high lane would.
pub fn hash(data: &[u8]) -> u64 {
    let mut h1 = SEED;
    let mut h2 = SEED;

    let nblocks = data.len() / 16;
    for i in 0..nblocks {
        let off = i * 16;
        let mut k1 = u64::from_le_bytes(data[off..off + 8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(data[off + 8..off + 16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    if tail.len() > 8 {
        for (i, &b) in tail[8..].iter().enumerate() {
            k2 ^= (b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        let head_len = tail.len().min(8);
        for (i, &b) in tail[..head_len].iter().enumerate() {
            k1 ^= (b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    // h2 = h2.wrapping_add(h1) would complete the 128-bit digest; only h1 is needed here.

    h1
}
