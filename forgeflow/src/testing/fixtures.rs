//! Canned requests and stage outputs.
//!
//! Every canned output passes its stage's validation, so a registry of
//! [`ScriptedAgent`]s without scripts completes a run in six invocations.

use std::sync::Arc;

use super::ScriptedAgent;
use crate::agents::AgentRegistry;
use crate::core::{ProjectRequest, RequestOptions, StageKind};

/// Requirements document for the calculator project.
pub const REQUIREMENTS: &str = "# Requirements\n\n\
- Evaluate +, -, * and / on two numbers\n\
- Division by zero prints an error instead of crashing\n\
- Runs as `calc 2 + 3`\n";

/// Architecture with a module list.
pub const ARCHITECTURE: &str = "# Architecture\n\n\
MODULE: calc/parser - turns argv into an expression\n\
MODULE: calc/ops - arithmetic with zero checks\n\
MODULE: calc/cli - entry point\n";

/// Source files for the calculator.
pub const IMPLEMENTATION: &str = "FILE: calc/ops.py\n\
```python\n\
def div(a, b):\n    if b == 0:\n        raise ValueError('division by zero')\n    return a / b\n\
```\n\n\
FILE: calc/cli.py\n\
```python\n\
import sys\nfrom calc.ops import div\n\nprint(div(float(sys.argv[1]), float(sys.argv[3])))\n\
```\n";

/// A report where every test passes.
pub const PASSING_TEST_REPORT: &str = "FILE: tests/test_ops.py\n\
```python\n\
from calc.ops import div\n\ndef test_div():\n    assert div(6, 3) == 2\n\
```\n\n\
TEST test_div: PASS\n\
TEST test_div_by_zero: PASS\n";

/// A report with one failing test.
pub const FAILING_TEST_REPORT: &str = "TEST test_div: PASS\n\
TEST test_div_by_zero: FAIL - ZeroDivisionError raised\n";

/// Documentation file set.
pub const DOCUMENTATION: &str = "FILE: README.md\n\
```markdown\n\
# calc\n\nRun `python -m calc.cli 6 / 3`.\n\
```\n";

/// Review notes.
pub const REVIEW: &str = "# Review\n\nDivision by zero is handled. Consider adding a REPL.\n";

/// The canned valid output of `stage`.
#[must_use]
pub fn canned_output(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Requirements => REQUIREMENTS,
        StageKind::Architecture => ARCHITECTURE,
        StageKind::Implementation => IMPLEMENTATION,
        StageKind::Testing => PASSING_TEST_REPORT,
        StageKind::Documentation => DOCUMENTATION,
        StageKind::Review => REVIEW,
    }
}

/// A request for a small CLI calculator.
#[must_use]
pub fn calculator_request() -> ProjectRequest {
    calculator_request_with(RequestOptions::new().with_language_hint("Python"))
}

/// The calculator request with explicit options.
#[must_use]
// The description is a non-empty literal.
#[allow(clippy::expect_used)]
pub fn calculator_request_with(options: RequestOptions) -> ProjectRequest {
    ProjectRequest::with_options(
        "A command line calculator that handles division by zero",
        options,
    )
    .expect("non-empty description")
}

/// A registry serving every stage with one unscripted [`ScriptedAgent`].
#[must_use]
pub fn scripted_registry() -> AgentRegistry {
    AgentRegistry::uniform(Arc::new(ScriptedAgent::new()))
}

/// A registry serving every stage with `agent`.
#[must_use]
pub fn registry_of(agent: &Arc<ScriptedAgent>) -> AgentRegistry {
    AgentRegistry::uniform(Arc::clone(agent) as Arc<dyn crate::agents::AgentAdapter>)
}
