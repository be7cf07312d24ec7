use std::fmt::{self, Write};

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Alignment {
    #[default]
    Left,
    Right,
}

pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        !self
            .cells
            .iter()
            .any(|cell| cell.contains(|c: char| c.is_whitespace()))
    }

    fn columns(&self) -> usize {
        self.cells.len()
    }
}

pub(crate) trait IntoRow: Into<Row> + Sized {
    fn into_row(self) -> Row {
        self.into()
    }
}

impl<T> IntoRow for T where T: Into<Row> + Sized {}

impl From<Vec<String>> for Row {
    fn from(value: Vec<String>) -> Self {
        Row { cells: value }
    }
}

impl From<Vec<&str>> for Row {
    fn from(value: Vec<&str>) -> Self {
        let value: Vec<String> = value.into_iter().map(|s| s.to_owned()).collect();

        value.into()
    }
}

pub(crate) struct Table {
    body: Vec<Row>,
    header: Option<Row>,
    num_columns: Option<usize>,
    alignments: Vec<Alignment>,
    print_header: bool,
}

impl Table {
    pub(crate) fn new() -> Table {
        Table {
            body: Vec::new(),
            header: None,
            num_columns: None,
            alignments: Vec::new(),
            print_header: true,
        }
    }

    fn expect_num_columns(&mut self, num_columns: usize) {
        match self.num_columns {
            Some(prev) if prev != num_columns => panic!(
                "Table has {} columns but a row with {} columns was inserted",
                prev, num_columns
            ),
            Some(_) => {}
            None => {
                self.num_columns = Some(num_columns);
            }
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    /// Right-align a column, for numeric output. Panics on an index past
    /// the established column count.
    pub(crate) fn align_right(&mut self, column: usize) {
        if let Some(num_columns) = self.num_columns {
            assert!(column < num_columns, "column {} out of range", column);
        }

        if self.alignments.len() <= column {
            self.alignments.resize(column + 1, Alignment::Left);
        }

        self.alignments[column] = Alignment::Right;
    }

    pub(crate) fn add_row<S: IntoRow>(&mut self, row: S) {
        let row = row.into_row();

        self.expect_num_columns(row.columns());

        self.body.push(row);
    }

    pub(crate) fn set_header<S: IntoRow>(&mut self, header: S) {
        let header = header.into_row();

        self.expect_num_columns(header.columns());

        if !header.is_awk_safe() {
            panic!("Table header is not awk safe, contains whitespace")
        }

        self.header.replace(header);
    }

    fn iter_rows(&self) -> impl Iterator<Item = &Row> {
        self.header.iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let n_cols = match self.num_columns {
            Some(n_cols) => n_cols,
            None => return Vec::new(),
        };

        let mut widths = vec![0usize; n_cols];

        for row in self.iter_rows() {
            for (i, cell) in row.cells.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        widths
    }

    fn alignment(&self, column: usize) -> Alignment {
        self.alignments.get(column).copied().unwrap_or_default()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let widths = self.column_widths();

        let mut print_row = |row: &Row| -> std::fmt::Result {
            for (i, cell) in row.cells.iter().enumerate() {
                match self.alignment(i) {
                    Alignment::Left => {
                        f.write_fmt(format_args!("{:<width$}", cell, width = widths[i]))?
                    }
                    Alignment::Right => {
                        f.write_fmt(format_args!("{:>width$}", cell, width = widths[i]))?
                    }
                }

                if i != row.cells.len() - 1 {
                    f.write_str("  ")?;
                }
            }

            f.write_char('\n')?;

            Ok(())
        };

        if self.print_header {
            for row in self.iter_rows() {
                print_row(row)?;
            }
        } else {
            for row in self.body.iter() {
                print_row(row)?;
            }
        }

        Ok(())
    }
}

pub(crate) trait IntoTable: Into<Table> + Sized {
    fn into_table(self) -> Table {
        self.into()
    }
}

impl<T> IntoTable for T where T: Into<Table> + Sized {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_aligned_columns_pad_on_the_left() {
        let mut tab = Table::new();

        tab.set_header(vec!["MODEL", "DOWNLOADS"]);
        tab.add_row(vec!["bert", "120000"]);
        tab.add_row(vec!["tiny", "9"]);
        tab.align_right(1);

        let rendered = tab.to_string();
        let lines: Vec<&str> = rendered.lines().collect();

        // a right-aligned last column pads every line to the same width
        assert!(lines.iter().all(|line| line.len() == lines[0].len()));
        assert!(lines[1].starts_with("bert") && lines[1].ends_with("120000"));
        assert!(lines[2].starts_with("tiny") && lines[2].ends_with(" 9"));
    }

    #[test]
    fn headerless_table_skips_the_header() {
        let mut tab = Table::new();

        tab.set_header(vec!["A"]);
        tab.add_row(vec!["x"]);
        tab.print_header(false);

        assert_eq!(tab.to_string(), "x\n");
    }
}
