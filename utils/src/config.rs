use clap::Args;

/// Tunable constants shared across every node and the coordinator (§3
/// "Configuration constants").
#[derive(Debug, Clone, Args)]
pub struct NetworkConfig {
    /// Identifier width in hex digits (`D`); the routing table has this
    /// many rows.
    #[arg(long, default_value_t = 4)]
    pub hash_hex_digits: usize,

    /// Bits per routing-table digit (`b`); yields `2^b` columns per row.
    #[arg(long, default_value_t = 4)]
    pub bits_per_digit: usize,

    /// Leaf-set capacity (`L`, even); split `L/2` below and `L/2` above.
    #[arg(long, default_value_t = 4)]
    pub leaf_set_size: usize,

    /// Nominal network size (`N`); `M = floor(sqrt(N))` is the
    /// neighborhood-set capacity.
    #[arg(long, default_value_t = 8)]
    pub network_size: usize,

    /// Worker threads per node's listening socket.
    #[arg(long, default_value_t = 10)]
    pub worker_pool_size: usize,

    /// Maximum wire message size, in bytes.
    #[arg(long, default_value_t = 65_536)]
    pub max_message_size: usize,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl NetworkConfig {
    pub fn routing_table_columns(&self) -> usize {
        1 << self.bits_per_digit
    }

    pub fn neighborhood_set_capacity(&self) -> usize {
        (self.network_size as f64).sqrt().floor() as usize
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hash_hex_digits: 4,
            bits_per_digit: 4,
            leaf_set_size: 4,
            network_size: 8,
            worker_pool_size: 10,
            max_message_size: 65_536,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_network_size() {
        let config = NetworkConfig::default();
        assert_eq!(config.hash_hex_digits, 4);
        assert_eq!(config.bits_per_digit, 4);
        assert_eq!(config.leaf_set_size, 4);
        assert_eq!(config.neighborhood_set_capacity(), 2);
        assert_eq!(config.routing_table_columns(), 16);
    }
}
