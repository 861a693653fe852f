#![forbid(unsafe_code)]

//! 256-bit XOR distance metric between a node id and a content id, plus the
//! radius-estimation formula used to re-target the soft storage capacity
//! after an operator lowers `capacityBytes`.

use ethereum_types::{U256, U512};

/// A 32-byte node or content identifier, interpreted as a big-endian integer
/// for distance purposes.
pub type NodeId = [u8; 32];

/// A 32-byte content-id digest, same representation as [`NodeId`].
pub type ContentId = [u8; 32];

/// `a XOR b`, interpreted as a big-endian 256-bit unsigned magnitude.
pub fn distance(a: &NodeId, b: &ContentId) -> U256 {
    let lhs = U256::from_big_endian(a);
    let rhs = U256::from_big_endian(b);
    lhs ^ rhs
}

/// `d1 > d2` under the distance metric. A thin, intention-revealing wrapper
/// around `U256`'s own ordering so call sites read naturally.
pub fn greater(d1: U256, d2: U256) -> bool {
    d1 > d2
}

/// Predicts a radius that, once enforced via `ForcePrune`, brings `used_bytes`
/// down to approximately `target_bytes`, assuming content ids are uniformly
/// distributed with respect to distance.
///
/// `old_radius * target_bytes / used_bytes`, computed with a 512-bit
/// intermediate product so the multiplication cannot overflow, and saturating
/// at `U256::MAX` both when `used_bytes == 0` and when the quotient itself
/// would not fit back into 256 bits.
pub fn estimate_new_radius(old_radius: U256, used_bytes: u64, target_bytes: u64) -> U256 {
    if used_bytes == 0 {
        return U256::max_value();
    }
    let product: U512 = old_radius.full_mul(U256::from(target_bytes));
    let divisor = U512::from(used_bytes);
    let (quotient, _remainder) = product.div_mod(divisor);
    U256::try_from(quotient).unwrap_or(U256::max_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_xor() {
        let a = [0xffu8; 32];
        let b = [0x00u8; 32];
        assert_eq!(distance(&a, &b), U256::max_value());
        assert_eq!(distance(&a, &a), U256::zero());
    }

    #[test]
    fn greater_matches_native_ordering() {
        assert!(greater(U256::from(20u64), U256::from(10u64)));
        assert!(!greater(U256::from(10u64), U256::from(20u64)));
        assert!(!greater(U256::from(10u64), U256::from(10u64)));
    }

    #[test]
    fn estimate_new_radius_zero_used_saturates() {
        let radius = U256::from(40u64);
        assert_eq!(estimate_new_radius(radius, 0, 20_000), U256::max_value());
    }

    #[test]
    fn estimate_new_radius_matches_a_worked_example() {
        // old_radius = 40, used_bytes = 80_000, target_bytes = 20_000 -> new_radius = 10
        let radius = U256::from(40u64);
        assert_eq!(estimate_new_radius(radius, 80_000, 20_000), U256::from(10u64));
    }

    #[test]
    fn estimate_new_radius_never_overflows_on_near_max_radius() {
        let radius = U256::max_value();
        // target_bytes > used_bytes would scale the radius up past U256::MAX; must saturate
        // rather than panic or wrap.
        let result = estimate_new_radius(radius, 1, u64::MAX);
        assert_eq!(result, U256::max_value());
    }

    #[test]
    fn estimate_new_radius_exact_division() {
        let radius = U256::from(1_000_000u64);
        assert_eq!(estimate_new_radius(radius, 1_000, 500), U256::from(500_000u64));
    }
}
