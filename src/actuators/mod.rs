pub mod esc;
pub mod pwm;
