mod jog;
mod status_parser;
