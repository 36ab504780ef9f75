pub mod time_of_day;
pub mod window;
