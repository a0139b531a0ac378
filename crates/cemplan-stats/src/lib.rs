//! Statistics helpers shared by the optimizer and the command line.
//!
//! - [`descriptive`]: summary statistics (min, max, mean, median, spread) of a list of
//!   scalar values, used to report the fitness of each iteration.
//! - [`elementwise`]: column-wise mean and population variance over equally-sized
//!   vectors, used to refit the sampling distribution from the elite candidates.
//!
//! # Examples
//!
//! ```
//! use cemplan_stats::descriptive::DescriptiveStats;
//!
//! let stats = DescriptiveStats::new([9.0, 12.0, 30.0, 21.0]).unwrap();
//! assert_eq!(stats.min, 9.0);
//! assert_eq!(stats.max, 30.0);
//! assert_eq!(stats.mean, 18.0);
//! ```
//!
//! ```
//! use cemplan_stats::elementwise;
//!
//! let rows: [Vec<f32>; 2] = [vec![1.0, 2.0], vec![3.0, 6.0]];
//! let mean = elementwise::mean(&rows).unwrap();
//! assert_eq!(mean, vec![2.0, 4.0]);
//! let variance = elementwise::population_variance(&rows, &mean);
//! assert_eq!(variance, vec![1.0, 4.0]);
//! ```

pub mod descriptive;
pub mod elementwise;
