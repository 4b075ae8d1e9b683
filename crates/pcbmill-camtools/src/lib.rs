//! # PcbMill CAM Tools
//!
//! Turns PCB fabrication artwork into machine programs for isolation
//! milling and drilling.
//!
//! ## Import
//!
//! - **Gerber**: RS-274X parser with aperture macros, regions, polarity,
//!   step-and-repeat and the obsolete statements still found in the wild
//! - **Excellon**: drill hits and routed slots with header and format
//!   detection
//!
//! Both produce a [`GeometryObject`]: a tool table of geometry fragments
//! plus merged solid and centerline geometry.
//!
//! ## Processing
//!
//! - **Geometry**: shape builders, boolean merging, offsetting and affine
//!   transforms over the `geo` crate
//! - **Optimizer**: R-tree indexed path joining and drill ordering
//! - **CNC job**: depth passes, seam overlap, travel planning and G-code
//!   output through pluggable preprocessors

pub mod aperture;
pub mod aperture_macro;
pub mod cncjob;
pub mod error;
pub mod excellon;
pub mod geometry;
pub mod gerber;
pub mod model;
pub mod optimizer;

// Re-export commonly used items
pub use aperture::{Aperture, ApertureShape, REGION_APERTURE};
pub use aperture_macro::ApertureMacro;
pub use cncjob::{
    preprocessor_by_name, CncJob, DirectTravel, ExclusionAreas, JobStats, MotionState,
    Preprocessor, ToolParams, TravelPlanner,
};
pub use error::{
    CamToolError, CamToolResult, ExcellonError, GerberError, JobError, JobResult, MacroError,
};
pub use excellon::ExcellonOptions;
pub use geometry::{JoinStyle, MergeStrategy, MirrorAxis, Shape};
pub use gerber::{Defect, GerberOptions, ParseStatus, ParsedGerber, SourceKind};
pub use model::{Fragment, GeometryObject, ToolEntry, ToolSummary};
pub use optimizer::{
    paint_connect, path_connect, LinearStorage, OrderingStrategy, PointOrderer, RTreeStorage,
    SpatialIndex, TspSolver, TwoOptSolver,
};
