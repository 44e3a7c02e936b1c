//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "kalman-filter".to_string()
}

pub fn default_version() -> String {
    "v1".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_min_variance() -> f64 {
    1e-4
}

pub fn default_max_variance() -> f64 {
    10.0
}

pub fn default_variance_reset_threshold() -> f64 {
    5.0
}

pub fn default_initial_variance() -> f64 {
    1.0
}

pub fn default_min_process_noise() -> f64 {
    1e-6
}

pub fn default_max_process_noise() -> f64 {
    0.1
}

pub fn default_window_capacity() -> usize {
    50
}

pub fn default_adaptation_interval() -> u64 {
    10
}

pub fn default_min_observations() -> usize {
    20
}

pub fn default_learning_rate() -> f64 {
    0.1
}

pub fn default_high_error_threshold() -> f64 {
    0.1
}

pub fn default_low_error_threshold() -> f64 {
    0.05
}

pub fn default_growth_factor() -> f64 {
    1.1
}

pub fn default_shrink_factor() -> f64 {
    0.95
}

pub fn default_missing_value_threshold() -> f64 {
    0.15
}

pub fn default_outlier_threshold() -> f64 {
    3.0
}

pub fn default_load_average_ceiling() -> f64 {
    100.0
}

pub fn default_cpu_cores() -> f64 {
    8.0
}

pub fn default_queue_capacity() -> usize {
    64
}
