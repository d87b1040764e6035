mod authorization;

use super::test_helpers::*;
use super::*;
