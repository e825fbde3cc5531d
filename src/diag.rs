// Diagnostic output sink, threaded through the pipeline so tests can
// run silent and the CLI can narrate under -v.


pub trait Diag {
    fn note(&mut self, msg: &str);
}


// The silent sink.
impl Diag for () {
    fn note(&mut self, _: &str) {}
}


// Chatty sink for the CLI.
pub struct Stderr;

impl Diag for Stderr {
    fn note(&mut self, msg: &str) {
        eprintln!("hotstate: {}", msg);
    }
}


// Capture sink, for asserting on notes in tests.
impl Diag for Vec<String> {
    fn note(&mut self, msg: &str) {
        self.push(String::from(msg));
    }
}
