use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::content::{
    Answer, Article, ContentItem, ContentKind, ContentReference, Patient, PatientStory, Question,
    UrlResolver,
};
use crate::error::{AppError, AppResult};
use crate::listing::{ListingEntry, ListingView};
use crate::related::{ListOwner, RelatedEntry};
use crate::storage::{
    ContentFilter, ContentOrder, FaqCategory, FaqHighlight, PatientAttribute, Storage, Tag,
};
use crate::study::{DisplayFlags, SessionStore, StudyState};
use crate::tags::QueryParams;

/// A top navigation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub label: String,
    pub url: String,
}

/// Frame shared by every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub flags: DisplayFlags,
    /// Active study session id, if any.
    pub study_session_id: Option<i64>,
    /// Empty when top navigation is hidden.
    pub navigation: Vec<NavLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomePage {
    pub context: PageContext,
    /// Editorial list; empty unless homepage content is shown.
    pub featured: Vec<RelatedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoriesPage {
    pub context: PageContext,
    pub listing: ListingView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesPage {
    pub context: PageContext,
    pub articles: Vec<ListingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPage {
    pub context: PageContext,
    pub question: Question,
    /// Published highlights in order.
    pub highlights: Vec<FaqHighlight>,
    pub answers: Vec<Answer>,
    pub related: Vec<RelatedEntry>,
}

/// One category on the FAQ index with its published questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqCategoryEntry {
    pub category: FaqCategory,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqCategoriesPage {
    pub context: PageContext,
    pub categories: Vec<FaqCategoryEntry>,
}

/// A question shown inside one of its categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryQuestionPage {
    pub category: FaqCategory,
    pub page: QuestionPage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPage {
    pub context: PageContext,
    pub patient: Patient,
    pub attributes: Vec<PatientAttribute>,
    pub tags: Vec<Tag>,
    pub stories: Vec<PatientStory>,
    pub related: Vec<RelatedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub context: PageContext,
    pub article: Article,
    pub children: Vec<Article>,
    pub related: Vec<RelatedEntry>,
}

const NAVIGATION: [(&str, &str); 3] = [
    ("Stories", "website-stories"),
    ("Questions", "website-faq-categories"),
    ("Resources", "website-resources"),
];

impl AppState {
    /// Resolve study state and build the shared page frame.
    pub async fn page_context(&self, session: &dyn SessionStore) -> AppResult<PageContext> {
        let StudyState { session, flags } = self.study.resolve(session).await?;

        let navigation = if flags.show_top_navigation {
            NAVIGATION
                .iter()
                .filter_map(|(label, route)| {
                    Some(NavLink {
                        label: label.to_string(),
                        url: self.routes.reverse(route, &[])?,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(PageContext {
            flags,
            study_session_id: session.map(|s| s.id),
            navigation,
        })
    }

    pub async fn home_page(&self, session: &dyn SessionStore) -> AppResult<HomePage> {
        let context = self.page_context(session).await?;

        let featured = if context.flags.show_content_on_homepage {
            let owner = ListOwner::named(self.config.site.homepage_list.clone());
            published_entries(self.related.get(&owner).await?)
        } else {
            Vec::new()
        };

        Ok(HomePage { context, featured })
    }

    /// Published patients, sorted and faceted by the query.
    pub async fn stories_page(
        &self,
        session: &dyn SessionStore,
        query: &QueryParams,
    ) -> AppResult<StoriesPage> {
        let context = self.page_context(session).await?;

        let patients = self
            .storage
            .query_content(
                ContentKind::Patient,
                &ContentFilter::published().ordered_by(ContentOrder::Title),
            )
            .await?;
        let listing = self.listing.render_list(patients, None, query).await?;

        Ok(StoriesPage { context, listing })
    }

    /// Top-level published articles in manual order.
    pub async fn resources_page(&self, session: &dyn SessionStore) -> AppResult<ResourcesPage> {
        let context = self.page_context(session).await?;

        let articles = self
            .storage
            .query_content(
                ContentKind::Article,
                &ContentFilter::published()
                    .top_level()
                    .ordered_by(ContentOrder::Order),
            )
            .await?;
        let articles = self.listing.entries_for(articles).await?;

        Ok(ResourcesPage { context, articles })
    }

    pub async fn question_page(
        &self,
        session: &dyn SessionStore,
        question_id: i64,
    ) -> AppResult<QuestionPage> {
        let context = self.page_context(session).await?;
        let reference = ContentReference::new(ContentKind::Question, question_id);

        let question = match self.primary_subject(reference).await? {
            ContentItem::Question(question) => question,
            _ => return Err(not_found(reference)),
        };

        let answers = self
            .storage
            .query_content(
                ContentKind::Answer,
                &ContentFilter::published()
                    .with_parent(question_id)
                    .ordered_by(ContentOrder::Order),
            )
            .await?
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Answer(answer) => Some(answer),
                _ => None,
            })
            .collect();

        let highlights = self.storage.get_faq_highlights(question_id).await?;
        let related = self.recommended(&context, reference).await?;

        Ok(QuestionPage {
            context,
            question,
            highlights,
            answers,
            related,
        })
    }

    /// Published FAQ categories in order, each with its published questions.
    pub async fn faq_categories_page(
        &self,
        session: &dyn SessionStore,
    ) -> AppResult<FaqCategoriesPage> {
        let context = self.page_context(session).await?;

        let mut categories = Vec::new();
        for category in self.storage.get_faq_categories(true).await? {
            let questions = self
                .storage
                .get_category_questions(category.id)
                .await?
                .into_iter()
                .filter(|q| q.published)
                .collect();
            categories.push(FaqCategoryEntry {
                category,
                questions,
            });
        }

        Ok(FaqCategoriesPage {
            context,
            categories,
        })
    }

    /// Question page framed by a category. Either id missing is not found.
    pub async fn category_question_page(
        &self,
        session: &dyn SessionStore,
        category_id: i64,
        question_id: i64,
    ) -> AppResult<CategoryQuestionPage> {
        let category = self
            .storage
            .get_faq_category(category_id)
            .await?
            .ok_or_else(|| AppError::not_found("FAQ category", category_id))?;
        let page = self.question_page(session, question_id).await?;

        Ok(CategoryQuestionPage { category, page })
    }

    pub async fn patient_page(
        &self,
        session: &dyn SessionStore,
        patient_id: i64,
    ) -> AppResult<PatientPage> {
        let context = self.page_context(session).await?;
        let reference = ContentReference::new(ContentKind::Patient, patient_id);

        let patient = match self.primary_subject(reference).await? {
            ContentItem::Patient(patient) => patient,
            _ => return Err(not_found(reference)),
        };

        let stories = self
            .storage
            .query_content(
                ContentKind::PatientStory,
                &ContentFilter::published()
                    .with_parent(patient_id)
                    .ordered_by(ContentOrder::Order),
            )
            .await?
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::PatientStory(story) => Some(story),
                _ => None,
            })
            .collect();

        let attributes = self.storage.get_patient_attributes(&[patient_id]).await?;
        let tags = self
            .storage
            .get_content_tags(reference)
            .await?
            .into_iter()
            .filter(|t| t.published)
            .collect();
        let related = self.recommended(&context, reference).await?;

        Ok(PatientPage {
            context,
            patient,
            attributes,
            tags,
            stories,
            related,
        })
    }

    pub async fn article_page(
        &self,
        session: &dyn SessionStore,
        article_id: i64,
    ) -> AppResult<ArticlePage> {
        let context = self.page_context(session).await?;
        let reference = ContentReference::new(ContentKind::Article, article_id);

        let article = match self.primary_subject(reference).await? {
            ContentItem::Article(article) => article,
            _ => return Err(not_found(reference)),
        };

        let children = self
            .storage
            .query_content(
                ContentKind::Article,
                &ContentFilter::published()
                    .with_parent(article_id)
                    .ordered_by(ContentOrder::Order),
            )
            .await?
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Article(child) => Some(child),
                _ => None,
            })
            .collect();

        let related = self.recommended(&context, reference).await?;

        Ok(ArticlePage {
            context,
            article,
            children,
            related,
        })
    }

    async fn primary_subject(&self, reference: ContentReference) -> AppResult<ContentItem> {
        self.resolver
            .resolve_reference(reference)
            .await?
            .ok_or_else(|| not_found(reference))
    }

    /// Published related items, or nothing when recommendations are hidden.
    async fn recommended(
        &self,
        context: &PageContext,
        owner: ContentReference,
    ) -> AppResult<Vec<RelatedEntry>> {
        if !context.flags.show_recommended_content {
            debug!(owner = %owner, "Recommended content hidden");
            return Ok(Vec::new());
        }
        let entries = self.related.get(&ListOwner::Content(owner)).await?;
        Ok(published_entries(entries))
    }
}

fn published_entries(entries: Vec<RelatedEntry>) -> Vec<RelatedEntry> {
    entries.into_iter().filter(|e| e.item.published()).collect()
}

fn not_found(reference: ContentReference) -> AppError {
    AppError::not_found(reference.kind.label(), reference.id)
}
