////////////////////////////////////////////////////////////////////////////////
// This file is part of "Deferred Call", a library of serializable,           //
// late-bound method invocations.                                             //
//                                                                            //
// This work is proprietary software with source-available code.              //
//                                                                            //
// To copy, use, distribute, or contribute to this work, you must agree to    //
// the terms of the General License Agreement:                                //
//                                                                            //
// https://github.com/Eliah-Lakhin/ad-astra/blob/master/EULA.md               //
//                                                                            //
// The agreement grants a Basic Commercial License, allowing you to use       //
// this work in non-commercial and limited commercial products with a total   //
// gross revenue cap. To remove this commercial limit for one of your         //
// products, you must acquire a Full Commercial License.                      //
//                                                                            //
// If you contribute to the source code, documentation, or related materials, //
// you must grant me an exclusive license to these contributions.             //
// Contributions are governed by the "Contributions" section of the General   //
// License Agreement.                                                         //
//                                                                            //
// Copying the work in parts is strictly forbidden, except as permitted       //
// under the General License Agreement.                                       //
//                                                                            //
// If you do not or cannot agree to the terms of this Agreement,              //
// do not use this work.                                                      //
//                                                                            //
// This work is provided "as is", without any warranties, express or implied, //
// except where such disclaimers are legally invalid.                         //
//                                                                            //
// Copyright (c) 2024 Ilya Lakhin (Илья Александрович Лахин).                 //
// All rights reserved.                                                       //
////////////////////////////////////////////////////////////////////////////////

use compact_str::CompactString;
use strsim::normalized_damerau_levenshtein;

use crate::runtime::RegistryConfig;

// Picks the candidate closest to `pattern`, provided it is close enough
// under `config`. Ties resolve to the lexicographically smallest candidate.
pub(super) fn suggest<'a>(
    config: &RegistryConfig,
    pattern: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<CompactString> {
    if !config.suggestions {
        return None;
    }

    let threshold = f64::from(config.suggestion_closeness) / 100.0;

    let mut best: Option<(f64, &'a str)> = None;

    for candidate in candidates {
        let closeness = normalized_damerau_levenshtein(pattern, candidate);

        if closeness < threshold {
            continue;
        }

        match best {
            Some((previous, name))
                if previous > closeness || (previous == closeness && name <= candidate) => {}
            _ => best = Some((closeness, candidate)),
        }
    }

    best.map(|(_, name)| CompactString::from(name))
}
