pub mod method_writer;
