use clap::ValueEnum;

/// Programs bundled with the driver.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sample {
    /// Arithmetic on the first tower.
    #[default]
    Add,
    /// String literals, print and output-char.
    Hello,
    /// A forward jump reference resolved by a later label.
    Labels,
}

const ADD: &str = "
    100 200 +   ; add 100 and 200
    400         ; push 400 to stack
    +           ; add result
";

const HELLO: &str = "
    'hello world'>
    10.
    'wow!'>
";

const LABELS: &str = "
    ;'wow'
    ;4 1 _
    (loop)
    ;\"
    ;1 0 _ 0 1 _
    ;1 2 _ 0 1 _
    [loop]
    10
";

impl Sample {
    pub fn source(self) -> &'static str {
        match self {
            Sample::Add => ADD,
            Sample::Hello => HELLO,
            Sample::Labels => LABELS,
        }
    }
}
