pub mod gemv;
