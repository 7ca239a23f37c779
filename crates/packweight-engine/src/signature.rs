//! Slot signatures via xxh3.
//!
//! A signature covers only what can change mass: code, stack size,
//! durability, stack mass override, and liquid code/amount pairs. Cosmetic
//! attributes are ignored.

use packweight_core::ItemStack;
use xxhash_rust::xxh3::Xxh3;

/// Signature of an empty slot. Occupied slots never hash to this value.
pub const EMPTY: u64 = 0;

pub fn slot_signature(stack: Option<&ItemStack>) -> u64 {
    let Some(stack) = stack else {
        return EMPTY;
    };

    let mut hasher = Xxh3::new();
    hasher.update(&(stack.code.len() as u64).to_le_bytes());
    hasher.update(stack.code.as_bytes());
    hasher.update(&stack.size.to_le_bytes());

    match stack.durability {
        Some(d) => {
            hasher.update(&[1]);
            hasher.update(&d.remaining.to_le_bytes());
            hasher.update(&d.max.to_le_bytes());
        }
        None => hasher.update(&[0]),
    }

    match stack.mass_override() {
        Some(m) => {
            hasher.update(&[1]);
            hasher.update(&m.to_bits().to_le_bytes());
        }
        None => hasher.update(&[0]),
    }

    let contents = stack.liquid_contents();
    hasher.update(&(contents.len() as u64).to_le_bytes());
    for entry in contents {
        match entry.code.as_deref() {
            Some(code) => {
                hasher.update(&(code.len() as u64).to_le_bytes());
                hasher.update(code.as_bytes());
            }
            None => hasher.update(&u64::MAX.to_le_bytes()),
        }
        hasher.update(&entry.amount.to_bits().to_le_bytes());
    }

    match hasher.digest() {
        EMPTY => 1,
        h => h,
    }
}
