//! Unit conversions for balances, gas prices and fees

use alloy::primitives::U256;

pub const ETHER_DECIMALS: u32 = 18;
pub const GWEI_DECIMALS: u32 = 9;

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

/// Whole ether amount in wei
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10).pow(U256::from(ETHER_DECIMALS))
}

pub fn format_ether(wei: U256) -> String {
    format_units(wei, ETHER_DECIMALS)
}

pub fn format_gwei(wei: u128) -> String {
    format_units(U256::from(wei), GWEI_DECIMALS)
}

/// Fee in wei for `gas` units at `gas_price` wei per unit
pub fn calculate_fee(gas: u64, gas_price: u128) -> U256 {
    U256::from(gas) * U256::from(gas_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_units(one_eth, 18), "1");

        let one_point_five = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_units(one_point_five, 18), "1.5");

        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn ether_round_trips_through_formatting() {
        assert_eq!(format_ether(ether(100)), "100");
    }

    #[test]
    fn gwei_and_fee() {
        assert_eq!(format_gwei(1_500_000_000), "1.5");
        assert_eq!(calculate_fee(21_000, 2_000_000_000), U256::from(42_000_000_000_000u64));
    }
}
