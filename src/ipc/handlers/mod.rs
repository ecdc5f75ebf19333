pub mod backup;
pub mod calc;
pub mod core;
pub mod exams;
pub mod students;
pub mod teachers;
