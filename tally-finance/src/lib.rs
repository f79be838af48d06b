//! tally-finance: learned mapping, oracle and operator seams, the tiered
//! category resolver, and the run pipeline that ties them to history.

pub mod mapping;
pub mod operator;
pub mod oracle;
pub mod pipeline;
pub mod resolver;
pub mod testing;

pub use mapping::{LearnedMapping, MAPPING_COLUMNS, MappingEntry};
pub use operator::{CategoryRequest, Fallback, Operator};
pub use oracle::{CategoryOracle, clean_response, instruction_prompt, user_query};
pub use pipeline::{Pipeline, RunReport};
pub use resolver::{CategoryResolver, Resolution, ResolveState, ResolveStats, Tier};
