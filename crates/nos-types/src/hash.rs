//! # Subscriber Ids
//!
//! Subscriber ids are derived from names with Bob Jenkins' lookup3 mix over
//! the first 32 bytes of the zero-padded name, read as eight little-endian
//! words. Remote peers compute the same value to identify themselves.

/// Number of name bytes that take part in the id.
pub const HASHED_NAME_LEN: usize = 32;

const WORDS: usize = HASHED_NAME_LEN / 4;

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline]
fn finalize(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// lookup3 `hashword` over a word slice.
fn hash_words(words: &[u32]) -> u32 {
    let init = 0xdead_beef_u32.wrapping_add((words.len() as u32) << 2);
    let (mut a, mut b, mut c) = (init, init, init);

    let mut rest = words;
    while rest.len() > 3 {
        a = a.wrapping_add(rest[0]);
        b = b.wrapping_add(rest[1]);
        c = c.wrapping_add(rest[2]);
        mix(&mut a, &mut b, &mut c);
        rest = &rest[3..];
    }

    match rest.len() {
        3 => {
            c = c.wrapping_add(rest[2]);
            b = b.wrapping_add(rest[1]);
            a = a.wrapping_add(rest[0]);
            finalize(&mut a, &mut b, &mut c);
        }
        2 => {
            b = b.wrapping_add(rest[1]);
            a = a.wrapping_add(rest[0]);
            finalize(&mut a, &mut b, &mut c);
        }
        1 => {
            a = a.wrapping_add(rest[0]);
            finalize(&mut a, &mut b, &mut c);
        }
        _ => {}
    }
    c
}

/// Id of the subscriber called `name`.
#[must_use]
pub fn component_id(name: &str) -> u32 {
    let mut padded = [0u8; HASHED_NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(HASHED_NAME_LEN);
    padded[..n].copy_from_slice(&bytes[..n]);

    let mut words = [0u32; WORDS];
    for (word, chunk) in words.iter_mut().zip(padded.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    hash_words(&words)
}
