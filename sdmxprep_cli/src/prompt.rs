use std::io::{BufRead, Write};

use log::warn;
use sdmxprep::error::{Result, SdmxPrepError};
use sdmxprep::resolver::{parse_selection, Candidate, CodeSelector, Selection};
use sdmxprep::vocabulary::ValuePair;

use crate::display::candidates_table;

/// Asks on `output` and reads the choice from `input`, re-prompting until the answer is valid.
pub struct ConsoleSelector<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> CodeSelector for ConsoleSelector<R, W> {
    fn select(&mut self, pair: &ValuePair, candidates: &[Candidate]) -> Result<Selection> {
        let shown = candidates.len();
        writeln!(
            self.output,
            "\n`{}` in dimension `{}` (from `{}`) has no exact code",
            pair.value, pair.exchange_dimension, pair.dimension_name
        )?;
        writeln!(self.output, "{}", candidates_table(pair, candidates))?;
        loop {
            write!(
                self.output,
                "Choose 1-{shown}, or {} for no match: ",
                shown + 1
            )?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                warn!("Input closed; leaving `{}` unresolved", pair.value);
                return Ok(Selection::Defer);
            }
            match parse_selection(&line, shown) {
                Ok(selection) => return Ok(selection),
                Err(err @ SdmxPrepError::InputValidation { .. }) => {
                    writeln!(self.output, "{err}")?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
