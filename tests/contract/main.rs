mod common;
mod gateway;
mod google;
mod openai;
