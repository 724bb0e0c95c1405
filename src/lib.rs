//! Distributed mesh topology and right-hand-side assembly for finite element computations.
//!
//! The crate provides
//!
//! - [`Topology`](topology::Topology): entity counts, ghost ranges, global numbering,
//!   shared entities and connectivity of a partitioned mesh,
//! - [`VectorAssembler`](assembly::vector::VectorAssembler): assembly of linear forms over the
//!   owned cells of a process,
//! - [`LiftingOperator`](assembly::lifting::LiftingOperator): application of Dirichlet
//!   boundary conditions to an assembled vector without modifying the matrix.
//!
//! Local element tensors are supplied through the [`LinearForm`](form::LinearForm) and
//! [`BilinearForm`](form::BilinearForm) traits, boundary conditions through
//! [`DirichletCondition`](bc::DirichletCondition).
pub mod assembly;
pub mod bc;
pub mod connectivity;
pub mod error;
pub mod form;
pub mod space;
pub mod topology;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
