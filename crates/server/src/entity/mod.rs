pub mod scholarship;
pub mod student;
