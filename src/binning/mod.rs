//! Binned SAH split selection and primitive partitioning.

mod bin_info;
mod mapping;
mod split;

pub use bin_info::BinInfo;
pub use mapping::{MAX_BINS, Mapping};
pub use split::{
    ListSplit, Split, evaluate_split, evaluate_split_chunked, evaluate_split_chunks,
    evaluate_split_list,
};

pub(crate) use split::ListRouter;
